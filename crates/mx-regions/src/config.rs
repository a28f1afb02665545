//! Analysis-wide constants shared by every assembler.

use std::path::Path;

use mx_core::Result;
use mx_pipeline::operators::{PhotonCriterion, PhotonWp};
use serde::{Deserialize, Serialize};

/// Working point, photon identification recipe, trigger paths and generator
/// tags. Every field has a default, so an empty document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Photon identification working point.
    pub photon_wp: PhotonWp,
    /// Criteria of the full (candidate) photon selection.
    pub photon_full_selection: Vec<PhotonCriterion>,
    /// Single-photon trigger applied to real data.
    pub photon_trigger: String,
    /// Single-electron trigger (tag & probe, Z→ee).
    pub electron_trigger: String,
    /// Single-muon trigger (tag & probe).
    pub muon_trigger: String,
    /// Single-muon trigger used for Z→μμ.
    pub dimuon_trigger: String,
    /// Identifier fragments of NLO generators that carry PDF replica weights.
    pub nlo_generators: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        use PhotonCriterion::*;
        Self {
            photon_wp: PhotonWp::Medium,
            photon_full_selection: vec![
                HOverE,
                Sieie,
                NHIso,
                PhIso,
                CHIsoMax,
                EVeto,
                MIP49,
                Time,
                SieieNonzero,
                SipipNonzero,
                NoisyRegion,
            ],
            photon_trigger: "HLT_Photon165_HE10".into(),
            electron_trigger: "HLT_Ele27_WPTight_Gsf".into(),
            muon_trigger: "HLT_IsoMu24_OR_HLT_IsoTkMu24".into(),
            dimuon_trigger: "HLT_IsoMu20_OR_HLT_IsoTkMu20".into(),
            nlo_generators: vec!["amcatnlo".into(), "madgraph".into()],
        }
    }
}

impl AnalysisConfig {
    /// Load from a `.json` file, or YAML for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Parse from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Parse from YAML.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(s)?)
    }

    /// The full photon selection with `remove` taken out and `add` appended.
    pub fn photon_selection_with(
        &self,
        remove: &[PhotonCriterion],
        add: &[PhotonCriterion],
    ) -> Vec<PhotonCriterion> {
        let mut sels: Vec<PhotonCriterion> =
            self.photon_full_selection.iter().copied().filter(|c| !remove.contains(c)).collect();
        sels.extend_from_slice(add);
        sels
    }
}
