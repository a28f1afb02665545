//! Common data types for MonoX

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata describing one input sample (a real-data stream or a simulated process).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDescriptor {
    /// Short sample name (e.g. `"znng-130"`), used for correction-table lookup.
    pub name: String,

    /// Full dataset identifier, matched by substring against pileup eras and
    /// generator names.
    pub identifier: String,

    /// Real collision data rather than simulation.
    #[serde(default, rename = "data")]
    pub is_data: bool,

    /// Production cross section in pb (simulation only).
    #[serde(default)]
    pub cross_section: f64,

    /// Sum of generator weights over the full sample (simulation only).
    #[serde(default)]
    pub sum_weights: f64,
}

impl SampleDescriptor {
    /// Describe a real-data sample.
    pub fn data(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            is_data: true,
            cross_section: 0.0,
            sum_weights: 0.0,
        }
    }

    /// Describe a simulated sample.
    pub fn simulation(
        name: impl Into<String>,
        identifier: impl Into<String>,
        cross_section: f64,
        sum_weights: f64,
    ) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            is_data: false,
            cross_section,
            sum_weights,
        }
    }

    /// Per-event normalization `cross_section / sum_weights`.
    ///
    /// Returns 0 when the sum of weights is not positive.
    pub fn normalization(&self) -> f64 {
        if self.sum_weights > 0.0 { self.cross_section / self.sum_weights } else { 0.0 }
    }

    /// Whether the dataset was produced with one of the given generator tools.
    pub fn generated_with(&self, tools: &[&str]) -> bool {
        tools.iter().any(|t| self.identifier.contains(t))
    }
}

/// Result of evaluating one operator on one event.
///
/// `decision: None` means the operator does not gate events (treated as pass);
/// `weight: None` means it does not weight events (treated as 1 with no
/// variations).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Pass/fail outcome, if the operator produces one.
    pub decision: Option<bool>,
    /// Nominal weight contribution, if the operator produces one.
    pub weight: Option<f64>,
    /// Alternate weight contributions keyed by variation name.
    pub variations: BTreeMap<String, f64>,
}

impl Evaluation {
    /// Neither a decision nor a weight (pure computation stage).
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Decision-only evaluation.
    pub fn decision(pass: bool) -> Self {
        Self { decision: Some(pass), ..Self::default() }
    }

    /// Weight-only evaluation.
    pub fn weight(value: f64) -> Self {
        Self { weight: Some(value), ..Self::default() }
    }

    /// Attach a variation weight.
    pub fn with_variation(mut self, name: impl Into<String>, value: f64) -> Self {
        self.variations.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_xs_over_sumw() {
        let s = SampleDescriptor::simulation("znng-130", "ZNuNuGJets_MonoPhoton", 10.0, 1000.0);
        assert_eq!(s.normalization(), 0.01);
        assert!(!s.is_data);

        let empty = SampleDescriptor::simulation("x", "x", 10.0, 0.0);
        assert_eq!(empty.normalization(), 0.0);
    }

    #[test]
    fn generator_match_uses_identifier() {
        let s = SampleDescriptor::simulation(
            "wnlg-130",
            "WGJets_MonoPhoton_PtG-130_TuneCUETP8M1_13TeV-madgraph",
            1.0,
            1.0,
        );
        assert!(s.generated_with(&["amcatnlo", "madgraph"]));
        assert!(!s.generated_with(&["powheg"]));
    }

    #[test]
    fn evaluation_builders() {
        let e = Evaluation::weight(2.0).with_variation("up", 3.0);
        assert_eq!(e.decision, None);
        assert_eq!(e.weight, Some(2.0));
        assert_eq!(e.variations.get("up"), Some(&3.0));
        assert_eq!(Evaluation::decision(false).decision, Some(false));
        assert_eq!(Evaluation::neutral(), Evaluation::default());
    }
}
