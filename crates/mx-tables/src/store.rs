//! Process-wide side-table store.
//!
//! Loaded once at start-up and shared read-only (`Arc`) by every assembler:
//! pileup profiles per era, named scale-factor/transfer-factor tables, and
//! per-process correction families (`kfactor`, `ewk`) with variations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::binned::{BinnedTable, CorrectionTable};
use crate::error::{Result, TableError};

/// On-disk layout of a side-table file (JSON or YAML).
#[derive(Debug, Default, Deserialize)]
struct TableFile {
    #[serde(default)]
    pileup: BTreeMap<String, BinnedTable>,
    #[serde(default)]
    tables: BTreeMap<String, BinnedTable>,
    #[serde(default)]
    corrections: BTreeMap<String, BTreeMap<String, CorrectionTable>>,
}

/// Read-only collection of every correction table an assembler may need.
#[derive(Debug, Clone, Default)]
pub struct TableStore {
    pileup: BTreeMap<String, Arc<BinnedTable>>,
    tables: BTreeMap<String, Arc<BinnedTable>>,
    corrections: BTreeMap<String, BTreeMap<String, Arc<CorrectionTable>>>,
}

impl TableStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a `.json` file, or YAML for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let file: TableFile = if ext == "json" {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml_ng::from_slice(&bytes)?
        };
        let store = Self::from_file(file)?;
        log::debug!(
            "loaded side tables from {}: {} pileup eras, {} tables, {} correction families",
            path.display(),
            store.pileup.len(),
            store.tables.len(),
            store.corrections.len()
        );
        Ok(store)
    }

    /// Parse a store from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Self::from_file(serde_json::from_str(s)?)
    }

    /// Parse a store from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Self::from_file(serde_yaml_ng::from_str(s)?)
    }

    fn from_file(file: TableFile) -> Result<Self> {
        let mut store = Self::new();
        for (era, table) in file.pileup {
            store.insert_pileup(era, table)?;
        }
        for (name, table) in file.tables {
            store.insert_table(name, table)?;
        }
        for (family, entries) in file.corrections {
            for (sample, table) in entries {
                store.insert_correction(family.clone(), sample, table)?;
            }
        }
        Ok(store)
    }

    /// Register the pileup reweighting profile of one era.
    pub fn insert_pileup(&mut self, era: impl Into<String>, mut table: BinnedTable) -> Result<()> {
        let era = era.into();
        table.set_name_if_empty(|| format!("puweight_{era}"));
        table.validate()?;
        self.pileup.insert(era, Arc::new(table));
        Ok(())
    }

    /// Register a named table.
    pub fn insert_table(&mut self, name: impl Into<String>, mut table: BinnedTable) -> Result<()> {
        let name = name.into();
        table.set_name_if_empty(|| name.clone());
        table.validate()?;
        self.tables.insert(name, Arc::new(table));
        Ok(())
    }

    /// Register a per-process correction within a family (`kfactor`, `ewk`, ...).
    pub fn insert_correction(
        &mut self,
        family: impl Into<String>,
        sample: impl Into<String>,
        table: CorrectionTable,
    ) -> Result<()> {
        table.validate()?;
        self.corrections.entry(family.into()).or_default().insert(sample.into(), Arc::new(table));
        Ok(())
    }

    /// Named table, or a `Missing` error.
    pub fn table(&self, name: &str) -> Result<Arc<BinnedTable>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| TableError::Missing(format!("side table '{name}' not loaded")))
    }

    /// Whether a named table is loaded.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Pileup profile whose era name occurs in the dataset identifier.
    ///
    /// The longest matching era wins so that `Summer16_80X` beats `Summer16`;
    /// two different matches of equal length are ambiguous.
    pub fn pileup_for(&self, identifier: &str) -> Result<(String, Arc<BinnedTable>)> {
        let mut best: Option<(&String, &Arc<BinnedTable>)> = None;
        let mut tied = false;
        let matching = self.pileup.iter().filter(|(era, _)| identifier.contains(era.as_str()));
        for (era, table) in matching {
            match best {
                Some((b, _)) if b.len() > era.len() => {}
                Some((b, _)) if b.len() == era.len() => tied = true,
                _ => {
                    best = Some((era, table));
                    tied = false;
                }
            }
        }

        match best {
            Some((era, _)) if tied => Err(TableError::Missing(format!(
                "ambiguous pileup profile for '{identifier}' (several eras of length {})",
                era.len()
            ))),
            Some((era, table)) => Ok((era.clone(), Arc::clone(table))),
            None => {
                Err(TableError::Missing(format!("pileup profile for '{identifier}' not defined")))
            }
        }
    }

    /// Correction of a family for one process, if defined.
    pub fn correction(&self, family: &str, sample: &str) -> Option<Arc<CorrectionTable>> {
        self.corrections.get(family).and_then(|f| f.get(sample)).cloned()
    }

    /// Loaded pileup eras.
    pub fn eras(&self) -> impl Iterator<Item = &str> {
        self.pileup.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::{Lookup, VariationLookup};

    const STORE: &str = r#"{
        "pileup": {
            "Summer16": { "x_edges": [0, 20, 80], "values": [1.2, 0.8] },
            "Summer16_FlatPU": { "x_edges": [0, 80], "values": [1.0] }
        },
        "tables": {
            "photon_sf": {
                "x_edges": [-1.5, 0.0, 1.5],
                "y_edges": [175, 1000],
                "values": [0.98, 0.99],
                "errors": [0.01, 0.02]
            }
        },
        "corrections": {
            "kfactor": {
                "znng": {
                    "nominal": { "x_edges": [175, 1000], "values": [1.4] },
                    "variations": { "renUp": { "x_edges": [175, 1000], "values": [1.5] } }
                }
            }
        }
    }"#;

    #[test]
    fn parses_all_sections() {
        let s = TableStore::from_json_str(STORE).unwrap();
        assert_eq!(s.eras().collect::<Vec<_>>(), vec!["Summer16", "Summer16_FlatPU"]);

        let sf = s.table("photon_sf").unwrap();
        assert_eq!(sf.name(), "photon_sf");
        assert_eq!(sf.lookup(&[0.5, 300.0]), 0.99);
        assert_eq!(sf.uncertainty(&[-0.5, 300.0]), 0.01);

        let k = s.correction("kfactor", "znng").unwrap();
        assert_eq!(k.lookup(&[200.0]), 1.4);
        assert_eq!(k.lookup_variation(&[200.0], "renUp"), Some(1.5));
        assert!(s.correction("kfactor", "wnlg").is_none());
        assert!(s.correction("ewk", "znng").is_none());
    }

    #[test]
    fn pileup_prefers_most_specific_era() {
        let s = TableStore::from_json_str(STORE).unwrap();
        let (era, _) = s.pileup_for("GJets_HT-100To200_RunIISummer16_FlatPU28to62").unwrap();
        assert_eq!(era, "Summer16_FlatPU");
        let (era, t) = s.pileup_for("ZNuNuGJets_RunIISummer16MiniAODv2").unwrap();
        assert_eq!(era, "Summer16");
        assert_eq!(t.lookup(&[30.0]), 0.8);
    }

    #[test]
    fn pileup_missing_is_an_error() {
        let s = TableStore::from_json_str(STORE).unwrap();
        let err = s.pileup_for("RunIIFall17").unwrap_err();
        assert!(err.to_string().contains("not defined"));

        let core: mx_core::Error = err.into();
        assert!(matches!(core, mx_core::Error::Configuration(_)));
    }

    #[test]
    fn pileup_tie_is_ambiguous() {
        let mut s = TableStore::new();
        s.insert_pileup("EraA", BinnedTable::constant("", 1.0)).unwrap();
        s.insert_pileup("EraB", BinnedTable::constant("", 1.0)).unwrap();
        let err = s.pileup_for("sample_EraA_EraB").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn yaml_and_missing_table() {
        let yaml = "tables:\n  flat:\n    x_edges: [0.0, 1.0]\n    values: [2.0]\n";
        let s = TableStore::from_yaml_str(yaml).unwrap();
        assert!(s.has_table("flat"));
        assert!(matches!(s.table("nope"), Err(TableError::Missing(_))));
    }

    #[test]
    fn invalid_table_rejected_on_load() {
        let bad = r#"{ "tables": { "t": { "x_edges": [0, 1, 2], "values": [1.0] } } }"#;
        let err = TableStore::from_json_str(bad).unwrap_err();
        assert!(matches!(err, TableError::Json(_)));
        assert!(err.to_string().contains("expected 2 values"), "{err}");
    }
}
