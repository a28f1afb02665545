//! Binned 1D/2D lookup tables (scale factors, transfer factors, pileup profiles).

use std::collections::BTreeMap;

use mx_core::{Lookup, VariationLookup};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};

/// A rectangular binned table in one or two variables.
///
/// Values are stored row-major: `values[ix * ny + iy]`. Coordinates outside
/// the binning are clamped to the first/last bin, so a photon above the last
/// pT edge picks up the last scale factor.
///
/// Every constructor, deserialization included, validates the shape, so a
/// `BinnedTable` always has `nx * ny` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRepr")]
pub struct BinnedTable {
    name: String,
    x_edges: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y_edges: Option<Vec<f64>>,
    values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<f64>>,
}

/// On-disk form of a [`BinnedTable`], checked before it becomes one.
#[derive(Deserialize)]
struct TableRepr {
    #[serde(default)]
    name: String,
    x_edges: Vec<f64>,
    #[serde(default)]
    y_edges: Option<Vec<f64>>,
    values: Vec<f64>,
    #[serde(default)]
    errors: Option<Vec<f64>>,
}

impl TryFrom<TableRepr> for BinnedTable {
    type Error = TableError;

    fn try_from(r: TableRepr) -> Result<Self> {
        let t = Self {
            name: r.name,
            x_edges: r.x_edges,
            y_edges: r.y_edges,
            values: r.values,
            errors: r.errors,
        };
        t.validate()?;
        Ok(t)
    }
}

impl BinnedTable {
    /// Build a 1D table.
    pub fn one_d(name: impl Into<String>, x_edges: &[f64], values: &[f64]) -> Result<Self> {
        let t = Self {
            name: name.into(),
            x_edges: x_edges.to_vec(),
            y_edges: None,
            values: values.to_vec(),
            errors: None,
        };
        t.validate()?;
        Ok(t)
    }

    /// Build a 2D table (`values` row-major in x).
    pub fn two_d(
        name: impl Into<String>,
        x_edges: &[f64],
        y_edges: &[f64],
        values: &[f64],
    ) -> Result<Self> {
        let t = Self {
            name: name.into(),
            x_edges: x_edges.to_vec(),
            y_edges: Some(y_edges.to_vec()),
            values: values.to_vec(),
            errors: None,
        };
        t.validate()?;
        Ok(t)
    }

    /// Single-bin table returning `value` everywhere.
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            x_edges: vec![f64::MIN, f64::MAX],
            y_edges: None,
            values: vec![value],
            errors: None,
        }
    }

    /// Attach per-bin uncertainties.
    pub fn with_errors(mut self, errors: &[f64]) -> Result<Self> {
        self.errors = Some(errors.to_vec());
        self.validate()?;
        Ok(self)
    }

    /// Table name (filled from the store key when loaded).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name_if_empty(&mut self, name: impl FnOnce() -> String) {
        if self.name.is_empty() {
            self.name = name();
        }
    }

    /// Bin values, row-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of bins along x.
    pub fn nx(&self) -> usize {
        self.x_edges.len().saturating_sub(1)
    }

    /// Number of bins along y (1 for a 1D table).
    pub fn ny(&self) -> usize {
        self.y_edges.as_ref().map_or(1, |e| e.len().saturating_sub(1))
    }

    /// Check edge ordering and array lengths.
    pub fn validate(&self) -> Result<()> {
        let shape = |reason: String| TableError::Shape { table: self.name.clone(), reason };

        check_edges(&self.x_edges).map_err(|r| shape(format!("x edges: {r}")))?;
        if let Some(ref y) = self.y_edges {
            check_edges(y).map_err(|r| shape(format!("y edges: {r}")))?;
        }

        let n = self.nx() * self.ny();
        if self.values.len() != n {
            return Err(shape(format!("expected {n} values, got {}", self.values.len())));
        }
        if let Some(ref errs) = self.errors
            && errs.len() != n
        {
            return Err(shape(format!("expected {n} errors, got {}", errs.len())));
        }
        Ok(())
    }

    fn index(&self, vars: &[f64]) -> usize {
        let x = vars.first().copied().unwrap_or(0.0);
        let ix = clamped_bin(&self.x_edges, x);
        match self.y_edges {
            Some(ref y_edges) => {
                let y = vars.get(1).copied().unwrap_or(0.0);
                ix * self.ny() + clamped_bin(y_edges, y)
            }
            None => ix,
        }
    }
}

impl Lookup for BinnedTable {
    fn dimension(&self) -> usize {
        if self.y_edges.is_some() { 2 } else { 1 }
    }

    fn lookup(&self, vars: &[f64]) -> f64 {
        self.values.get(self.index(vars)).copied().unwrap_or(f64::NAN)
    }

    fn uncertainty(&self, vars: &[f64]) -> f64 {
        let i = self.index(vars);
        self.errors.as_ref().and_then(|e| e.get(i)).copied().unwrap_or(0.0)
    }
}

/// A nominal table plus named alternate tables with the same role
/// (e.g. a k-factor with renormalization/factorization scale variations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionTable {
    /// Nominal table.
    pub nominal: BinnedTable,
    /// Variation name → alternate table.
    #[serde(default)]
    pub variations: BTreeMap<String, BinnedTable>,
}

impl CorrectionTable {
    /// Wrap a nominal table with no variations.
    pub fn new(nominal: BinnedTable) -> Self {
        Self { nominal, variations: BTreeMap::new() }
    }

    /// Add a named variation table.
    pub fn variation(mut self, name: impl Into<String>, table: BinnedTable) -> Self {
        self.variations.insert(name.into(), table);
        self
    }

    /// Variation table by name.
    pub fn get_variation(&self, name: &str) -> Option<&BinnedTable> {
        self.variations.get(name)
    }

    /// Validate the nominal and every variation table.
    pub fn validate(&self) -> Result<()> {
        self.nominal.validate()?;
        for t in self.variations.values() {
            t.validate()?;
        }
        Ok(())
    }
}

impl Lookup for CorrectionTable {
    fn dimension(&self) -> usize {
        self.nominal.dimension()
    }

    fn lookup(&self, vars: &[f64]) -> f64 {
        self.nominal.lookup(vars)
    }

    fn uncertainty(&self, vars: &[f64]) -> f64 {
        self.nominal.uncertainty(vars)
    }
}

impl VariationLookup for CorrectionTable {
    fn variation_names(&self) -> Vec<String> {
        self.variations.keys().cloned().collect()
    }

    fn lookup_variation(&self, vars: &[f64], variation: &str) -> Option<f64> {
        self.variations.get(variation).map(|t| t.lookup(vars))
    }
}

fn check_edges(edges: &[f64]) -> std::result::Result<(), String> {
    if edges.len() < 2 {
        return Err(format!("need at least 2 edges, got {}", edges.len()));
    }
    if edges.windows(2).any(|w| !(w[0] < w[1])) {
        return Err("edges must be strictly increasing".into());
    }
    Ok(())
}

/// Bin index for `val`, clamping under/overflow (and NaN) into the edge bins.
fn clamped_bin(edges: &[f64], val: f64) -> usize {
    let n_bins = edges.len() - 1;
    if val.is_nan() || val < edges[0] {
        return 0;
    }
    // Number of edges <= val; the bin is the one starting at the last of them.
    let above = edges.partition_point(|&e| e <= val);
    above.saturating_sub(1).min(n_bins - 1)
}
