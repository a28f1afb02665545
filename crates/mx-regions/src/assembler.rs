//! Assembly context, pipeline seeds and the `Assembler`/`Decorator` types.

use std::sync::Arc;

use mx_core::{Error, Lookup, Result, SampleDescriptor};
use mx_pipeline::Pipeline;
use mx_pipeline::operators::{ConstantWeight, NnpdfVariation, PuWeight};
use mx_tables::TableStore;

use crate::config::AnalysisConfig;

/// Names of the side tables the region catalogue reads.
pub mod tables {
    /// Photon identification scale factor (x: eta, y: pT).
    pub const PHOTON_SF: &str = "photon_sf";
    /// Tight electron identification scale factor.
    pub const ELECTRON_TIGHT_SF: &str = "electron_tight_sf";
    /// Loose electron identification scale factor.
    pub const ELECTRON_LOOSE_SF: &str = "electron_loose_sf";
    /// GSF tracking scale factor (x: eta, y: npv).
    pub const ELECTRON_TRACK_SF: &str = "electron_track_sf";
    /// Tight muon identification scale factor (x: |eta|, y: pT).
    pub const MUON_TIGHT_SF: &str = "muon_tight_sf";
    /// Loose muon identification scale factor.
    pub const MUON_LOOSE_SF: &str = "muon_loose_sf";
    /// Muon tracking scale factor (x: npv).
    pub const MUON_TRACK_SF: &str = "muon_track_sf";
    /// Hadronic-proxy transfer factor.
    pub const HADRON_TFACTOR: &str = "hadron_tfactor";
    /// Transfer factor with the purity shifted up.
    pub const HADRON_TFACTOR_PURITY_UP: &str = "hadron_tfactor_purity_up";
    /// Transfer factor with the purity shifted down.
    pub const HADRON_TFACTOR_PURITY_DOWN: &str = "hadron_tfactor_purity_down";
    /// Transfer factor for the tight-isolation sideband.
    pub const HADRON_TFACTOR_TIGHT: &str = "hadron_tfactor_tight";
    /// Transfer factor for the loose-isolation sideband.
    pub const HADRON_TFACTOR_LOOSE: &str = "hadron_tfactor_loose";
    /// Electron → photon fake rate.
    pub const ELECTRON_FAKE_RATE: &str = "electron_fake_rate";

    /// QCD k-factor correction family.
    pub const KFACTOR: &str = "kfactor";
    /// Electroweak NLO correction family.
    pub const EWK: &str = "ewk";
}

/// Everything an assembler may read: the sample, the side tables and the
/// analysis constants.
#[derive(Debug, Clone)]
pub struct AssemblyContext {
    /// Sample being configured.
    pub sample: SampleDescriptor,
    /// Shared side tables.
    pub tables: Arc<TableStore>,
    /// Analysis constants.
    pub config: Arc<AnalysisConfig>,
}

impl AssemblyContext {
    /// Context with the default analysis constants.
    pub fn new(sample: SampleDescriptor, tables: Arc<TableStore>) -> Self {
        Self { sample, tables, config: Arc::new(AnalysisConfig::default()) }
    }

    /// Replace the analysis constants.
    pub fn with_config(mut self, config: Arc<AnalysisConfig>) -> Self {
        self.config = config;
        self
    }

    /// Named side table as a lookup, or a `Configuration` error.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Lookup>> {
        let table: Arc<dyn Lookup> = self.tables.table(name)?;
        Ok(table)
    }

    /// Whether the sample was produced with an NLO generator carrying PDF weights.
    pub fn is_nlo(&self) -> bool {
        let generators: Vec<&str> = self.config.nlo_generators.iter().map(String::as_str).collect();
        self.sample.generated_with(&generators)
    }

    /// Append the simulation normalization: `crosssection` and the pileup weight.
    ///
    /// A sample without a positive sum of weights is a `Configuration` error.
    pub fn add_mc_weights(&self, pipeline: &mut Pipeline) -> Result<()> {
        if self.sample.sum_weights <= 0.0 || self.sample.sum_weights.is_nan() {
            return Err(Error::Configuration(format!(
                "sample '{}' has no positive sum of weights ({})",
                self.sample.name, self.sample.sum_weights
            )));
        }
        pipeline.add_operator(ConstantWeight::new(self.sample.normalization(), "crosssection"))?;
        self.add_pileup_weight(pipeline)
    }

    /// Append the pileup weight whose era matches the sample identifier.
    pub fn add_pileup_weight(&self, pipeline: &mut Pipeline) -> Result<()> {
        let (era, profile) = self.tables.pileup_for(&self.sample.identifier)?;
        log::debug!("using pileup profile {era} for {}", self.sample.name);
        pipeline.add_operator(PuWeight::new(profile))
    }

    /// Append the PDF replica variation for NLO samples.
    pub fn add_pdf_variation(&self, pipeline: &mut Pipeline) -> Result<()> {
        if self.is_nlo() {
            pipeline.add_operator(NnpdfVariation::new())?;
        }
        Ok(())
    }
}

/// What an assembler starts from: a region name or a pipeline that already
/// carries stages (e.g. a decay filter at index 0).
pub enum PipelineSeed {
    /// Start from an empty pipeline with this name.
    Name(String),
    /// Continue from an existing pipeline.
    Pipeline(Pipeline),
}

impl PipelineSeed {
    /// Name the pipeline will carry.
    pub fn name(&self) -> &str {
        match self {
            PipelineSeed::Name(n) => n,
            PipelineSeed::Pipeline(p) => p.name(),
        }
    }

    /// Turn the seed into a pipeline.
    pub fn into_pipeline(self) -> Pipeline {
        match self {
            PipelineSeed::Name(n) => Pipeline::new(n),
            PipelineSeed::Pipeline(p) => p,
        }
    }
}

impl From<&str> for PipelineSeed {
    fn from(name: &str) -> Self {
        PipelineSeed::Name(name.to_string())
    }
}

impl From<String> for PipelineSeed {
    fn from(name: String) -> Self {
        PipelineSeed::Name(name)
    }
}

impl From<Pipeline> for PipelineSeed {
    fn from(pipeline: Pipeline) -> Self {
        PipelineSeed::Pipeline(pipeline)
    }
}

/// Builds the pipeline of one region for one sample.
pub type Assembler = Arc<dyn Fn(&AssemblyContext, PipelineSeed) -> Result<Pipeline> + Send + Sync>;

/// Wraps an assembler into one that post-processes its pipeline.
pub type Decorator = fn(Assembler) -> Assembler;

/// Wrap a plain function as an [`Assembler`].
pub fn assembler<F>(f: F) -> Assembler
where
    F: Fn(&AssemblyContext, PipelineSeed) -> Result<Pipeline> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Apply `decorators` in order: the first listed is innermost, so its
/// operators are added before those of later ones.
pub fn decorate(inner: Assembler, decorators: &[Decorator]) -> Assembler {
    decorators.iter().fold(inner, |acc, d| d(acc))
}
