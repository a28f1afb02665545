//! Skim configuration: which regions to build for which samples.
//!
//! ```yaml
//! common_selection: "photon_pt > 175 || nelectron + nmuon > 0"
//! analysis:
//!   photon_wp: medium
//! samples:
//!   - name: sph-16b
//!     identifier: SinglePhoton_Run2016B
//!     data: true
//!     regions:
//!       - name: monoph
//!       - name: efake
//!   - name: gj-400
//!     identifier: GJets_HT-400To600_Summer16
//!     cross_section: 93.4
//!     sum_weights: 4.9e6
//!     regions:
//!       - { name: monoph, decorators: [kfactor] }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mx_core::{Error, Result, SampleDescriptor};
use mx_pipeline::{CompiledExpr, GoodLumiFilter, OperatorSummary, Skimmer};
use mx_tables::TableStore;
use serde::{Deserialize, Serialize};

use crate::assembler::AssemblyContext;
use crate::catalog::RegionCatalog;
use crate::config::AnalysisConfig;

/// One region of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Region (pipeline) name.
    pub name: String,
    /// Catalogue assembler; defaults to the region name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembler: Option<String>,
    /// Catalogue decorators, innermost first.
    #[serde(default)]
    pub decorators: Vec<String>,
}

impl RegionConfig {
    /// Region built by the assembler of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), assembler: None, decorators: Vec::new() }
    }

    /// Use another assembler.
    pub fn with_assembler(mut self, assembler: impl Into<String>) -> Self {
        self.assembler = Some(assembler.into());
        self
    }

    /// Append a decorator.
    pub fn with_decorator(mut self, decorator: impl Into<String>) -> Self {
        self.decorators.push(decorator.into());
        self
    }

    /// Name of the assembler to resolve.
    pub fn assembler_name(&self) -> &str {
        self.assembler.as_deref().unwrap_or(&self.name)
    }
}

/// A sample and the regions it is skimmed into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Sample metadata.
    #[serde(flatten)]
    pub descriptor: SampleDescriptor,
    /// Regions to build.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    /// Certified-luminosity JSON mask (real data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_lumi: Option<PathBuf>,
}

/// Whole skim configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkimConfig {
    /// Preselection expression applied before any region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_selection: Option<String>,
    /// Analysis constants.
    pub analysis: AnalysisConfig,
    /// Samples.
    pub samples: Vec<SampleConfig>,
}

/// Assembled region as reported by `plan`.
#[derive(Debug, Clone, Serialize)]
pub struct RegionPlan {
    /// Region name.
    pub region: String,
    /// Assembler used.
    pub assembler: String,
    /// Decorators applied, innermost first.
    pub decorators: Vec<String>,
    /// Whether the common preselection may be applied.
    pub can_photon_skim: bool,
    /// Every weight variation the region reports.
    pub variations: Vec<String>,
    /// Stage-by-stage summary.
    pub operators: Vec<OperatorSummary>,
}

/// Region that could not be assembled.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRegion {
    /// Region name.
    pub region: String,
    /// Why assembly failed.
    pub error: String,
}

/// Assembly result for one sample.
#[derive(Debug, Clone, Serialize)]
pub struct SamplePlan {
    /// Sample name.
    pub sample: String,
    /// Real data.
    pub data: bool,
    /// Regions that assembled.
    pub regions: Vec<RegionPlan>,
    /// Regions skipped for this sample.
    pub skipped: Vec<SkippedRegion>,
}

impl SkimConfig {
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

    /// Sample configured as `name`.
    pub fn sample(&self, name: &str) -> Result<&SampleConfig> {
        self.samples
            .iter()
            .find(|s| s.descriptor.name == name)
            .ok_or_else(|| Error::Configuration(format!("sample '{name}' not configured")))
    }

    fn context(&self, sample: &SampleConfig, tables: &Arc<TableStore>) -> AssemblyContext {
        AssemblyContext::new(sample.descriptor.clone(), Arc::clone(tables))
            .with_config(Arc::new(self.analysis.clone()))
    }

    /// Assemble every region of `sample` without running anything.
    pub fn plan(
        &self,
        sample: &SampleConfig,
        tables: &Arc<TableStore>,
        catalog: &RegionCatalog,
    ) -> SamplePlan {
        let ctx = self.context(sample, tables);
        let mut regions = Vec::new();
        let mut skipped = Vec::new();

        for region in &sample.regions {
            let assembler = region.assembler_name();
            match catalog.build(&ctx, &region.name, assembler, &region.decorators) {
                Ok(p) => regions.push(RegionPlan {
                    region: region.name.clone(),
                    assembler: assembler.to_string(),
                    decorators: region.decorators.clone(),
                    can_photon_skim: p.can_photon_skim(),
                    variations: p.variation_names().into_iter().collect(),
                    operators: p.describe(),
                }),
                Err(e) => {
                    let (sample, name) = (&ctx.sample.name, &region.name);
                    log::warn!("sample '{sample}': skipping region '{name}': {e}");
                    skipped.push(SkippedRegion { region: name.clone(), error: e.to_string() })
                }
            }
        }

        SamplePlan {
            sample: sample.descriptor.name.clone(),
            data: sample.descriptor.is_data,
            regions,
            skipped,
        }
    }

    /// Skimmer for the sample configured as `name`. Regions that fail to
    /// assemble are logged and left out.
    pub fn skimmer(
        &self,
        name: &str,
        tables: &Arc<TableStore>,
        catalog: &RegionCatalog,
    ) -> Result<Skimmer> {
        let sample = self.sample(name)?;
        let ctx = self.context(sample, tables);
        let mut skimmer = Skimmer::new(name);

        if let Some(source) = &self.common_selection {
            skimmer = skimmer.common_selection(CompiledExpr::compile(source)?);
        }
        if let Some(path) = &sample.good_lumi {
            skimmer = skimmer.good_lumi(GoodLumiFilter::from_path(path)?);
        }

        for region in &sample.regions {
            match catalog.build(&ctx, &region.name, region.assembler_name(), &region.decorators) {
                Ok(p) => skimmer = skimmer.add_region(p),
                Err(e) => log::warn!("sample '{name}': skipping region '{}': {e}", region.name),
            }
        }
        Ok(skimmer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tables;
    use mx_tables::BinnedTable;

    const YAML: &str = r#"
common_selection: "photon_pt > 175"
samples:
  - name: sph-16b
    identifier: SinglePhoton_Run2016B
    data: true
    regions:
      - name: monoph
      - name: efake
  - name: gj-400
    identifier: GJets_HT-400To600_Summer16
    cross_section: 93.4
    sum_weights: 4.9e6
    regions:
      - name: monoph
        decorators: [kfactor]
      - name: gjetsAlt
        assembler: gjets
"#;

    fn tables() -> Arc<TableStore> {
        let mut s = TableStore::new();
        s.insert_pileup("Summer16", BinnedTable::constant("", 1.0)).unwrap();
        s.insert_table(tables::PHOTON_SF, BinnedTable::constant("", 1.0)).unwrap();
        Arc::new(s)
    }

    #[test]
    fn parses_samples_and_regions() {
        let cfg = SkimConfig::from_yaml_str(YAML).unwrap();
        let data = cfg.sample("sph-16b").unwrap();
        assert!(data.descriptor.is_data);
        assert_eq!(data.regions, vec![RegionConfig::new("monoph"), RegionConfig::new("efake")]);

        let mc = cfg.sample("gj-400").unwrap();
        assert_eq!(mc.regions[0].decorators, vec!["kfactor"]);
        assert_eq!(mc.regions[1].assembler_name(), "gjets");
        assert!(matches!(cfg.sample("wg"), Err(Error::Configuration(_))));
    }

    #[test]
    fn failing_regions_are_skipped() {
        let cfg = SkimConfig::from_yaml_str(YAML).unwrap();
        let catalog = RegionCatalog::standard();

        // No fake-rate table: efake cannot be built for data.
        let plan = cfg.plan(cfg.sample("sph-16b").unwrap(), &tables(), &catalog);
        assert_eq!(plan.regions.len(), 1);
        assert_eq!(plan.skipped[0].region, "efake");

        // No k-factor for gj: monoph is dropped, the renamed gjets region stays.
        let skimmer = cfg.skimmer("gj-400", &tables(), &catalog).unwrap();
        let names: Vec<_> = skimmer.regions().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["gjetsAlt"]);
    }
}
