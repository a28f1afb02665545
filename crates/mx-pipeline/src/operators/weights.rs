//! Weight-producing stages.
//!
//! None of these gate events; each contributes a nominal factor and
//! optionally named alternate factors to the combined event weight.

use std::sync::Arc;

use mx_core::{Evaluation, Lookup, VariationLookup};
use serde::{Deserialize, Serialize};

use crate::context::EventContext;
use crate::event::{Candidate, Collection, GenParticle};
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

macro_rules! weight_only {
    () => {
        fn produces_decision(&self) -> bool {
            false
        }

        fn produces_weight(&self) -> bool {
            true
        }
    };
}

/// Fixed factor with fixed alternates (cross-section normalization).
pub struct ConstantWeight {
    core: OperatorCore,
    value: f64,
    variations: Vec<(String, f64)>,
}

impl ConstantWeight {
    /// Factor `value` under `name`.
    pub fn new(value: f64, name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name), value, variations: Vec::new() }
    }

    /// Alternate factor.
    pub fn add_variation(&mut self, name: impl Into<String>, value: f64) {
        self.variations.push((name.into(), value));
    }

    /// Nominal factor.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Operator for ConstantWeight {
    operator_common!("ConstantWeight");
    weight_only!();

    fn variation_names(&self) -> Vec<String> {
        self.variations.iter().map(|(n, _)| n.clone()).collect()
    }

    fn evaluate(&self, _ctx: &mut EventContext<'_>) -> Evaluation {
        self.variations
            .iter()
            .fold(Evaluation::weight(self.value), |e, (n, v)| e.with_variation(n.clone(), *v))
    }
}

/// Pileup reweighting by the true number of interactions.
pub struct PuWeight {
    core: OperatorCore,
    profile: Arc<dyn Lookup>,
}

impl PuWeight {
    /// Reweight with a pileup profile ratio.
    pub fn new(profile: Arc<dyn Lookup>) -> Self {
        Self { core: OperatorCore::new("PUWeight"), profile }
    }
}

impl Operator for PuWeight {
    operator_common!("PuWeight");
    weight_only!();

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        Evaluation::weight(self.profile.lookup(&[ctx.input.true_pileup]))
    }
}

/// Lookup variable of an identification scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SfVariable {
    /// Object pT.
    Pt,
    /// Object pseudorapidity.
    Eta,
    /// |eta|.
    AbsEta,
    /// Number of primary vertices.
    Npv,
}

impl SfVariable {
    fn value(self, obj: &Candidate, npv: u32) -> f64 {
        match self {
            SfVariable::Pt => obj.pt,
            SfVariable::Eta => obj.eta,
            SfVariable::AbsEta => obj.eta.abs(),
            SfVariable::Npv => f64::from(npv),
        }
    }
}

/// Per-object identification scale factors.
///
/// The i-th selected object of the collection is weighted by the i-th
/// factor table (the last table is reused when there are fewer tables than
/// objects). `<name>Up`/`<name>Down` shift every factor by its uncertainty.
pub struct IdSfWeight {
    core: OperatorCore,
    collection: Collection,
    factors: Vec<Arc<dyn Lookup>>,
    n_particles: usize,
    variables: (SfVariable, Option<SfVariable>),
}

impl IdSfWeight {
    /// Scale factor on the leading object of `collection`, binned in pT.
    pub fn new(collection: Collection, name: impl Into<String>) -> Self {
        Self {
            core: OperatorCore::new(name),
            collection,
            factors: Vec::new(),
            n_particles: 1,
            variables: (SfVariable::Pt, None),
        }
    }

    /// Append a factor table.
    pub fn add_factor(&mut self, table: Arc<dyn Lookup>) {
        self.factors.push(table);
    }

    /// Number of leading objects to weight.
    pub fn set_n_particles(&mut self, n: usize) {
        self.n_particles = n;
    }

    /// Lookup variables (x, optional y).
    pub fn set_variable(&mut self, x: SfVariable, y: Option<SfVariable>) {
        self.variables = (x, y);
    }

    fn shifted(&self, ctx: &EventContext<'_>, sigma: f64) -> f64 {
        let objects = ctx.output.candidates(self.collection);
        objects
            .iter()
            .take(self.n_particles)
            .enumerate()
            .filter_map(|(i, obj)| {
                let table = self.factors.get(i).or(self.factors.last())?;
                let mut vars = vec![self.variables.0.value(obj, ctx.input.npv)];
                if let Some(y) = self.variables.1 {
                    vars.push(y.value(obj, ctx.input.npv));
                }
                Some(table.lookup(&vars) + sigma * table.uncertainty(&vars))
            })
            .product()
    }
}

impl Operator for IdSfWeight {
    operator_common!("IdSfWeight");
    weight_only!();

    fn variation_names(&self) -> Vec<String> {
        vec![format!("{}Up", self.name()), format!("{}Down", self.name())]
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        Evaluation::weight(self.shifted(ctx, 0.0))
            .with_variation(format!("{}Up", self.name()), self.shifted(ctx, 1.0))
            .with_variation(format!("{}Down", self.name()), self.shifted(ctx, -1.0))
    }
}

/// Which photon's pT a [`PhotonPtWeight`] is binned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotonType {
    /// The selected reconstructed photon.
    #[default]
    Reco,
    /// The leading final-state generator photon.
    PostShower,
    /// The leading hard-process generator photon.
    Parton,
}

fn leading_gen_photon(gen_particles: &[GenParticle], hard: bool) -> Option<f64> {
    gen_particles
        .iter()
        .filter(|p| p.pdg_id == 22 && if hard { p.hard_process } else { p.final_state })
        .map(|p| p.pt)
        .reduce(f64::max)
}

/// Where a [`PhotonPtWeight`] variation takes its factor from.
enum VariationSource {
    /// A separate table.
    Table(Arc<dyn Lookup>),
    /// A named entry of a table with alternates; the nominal where it has none.
    Entry(Arc<dyn VariationLookup>, String),
}

/// Weight binned in photon pT (k-factors, fake rates, transfer factors).
pub struct PhotonPtWeight {
    core: OperatorCore,
    table: Arc<dyn Lookup>,
    variations: Vec<(String, VariationSource)>,
    photon_type: PhotonType,
    use_errors: bool,
}

impl PhotonPtWeight {
    /// Weight `name` from `table`, binned in the reconstructed photon pT.
    pub fn new(table: Arc<dyn Lookup>, name: impl Into<String>) -> Self {
        Self {
            core: OperatorCore::new(name),
            table,
            variations: Vec::new(),
            photon_type: PhotonType::Reco,
            use_errors: false,
        }
    }

    /// Source of the photon pT.
    pub fn set_photon_type(&mut self, photon_type: PhotonType) {
        self.photon_type = photon_type;
    }

    /// Alternate table for variation `name`.
    pub fn add_variation(&mut self, name: impl Into<String>, table: Arc<dyn Lookup>) {
        self.variations.push((name.into(), VariationSource::Table(table)));
    }

    /// Variation `name` read from the alternate `entry` of `table`.
    pub fn add_table_variation(
        &mut self,
        name: impl Into<String>,
        table: Arc<dyn VariationLookup>,
        entry: impl Into<String>,
    ) {
        self.variations.push((name.into(), VariationSource::Entry(table, entry.into())));
    }

    /// Derive `<name>Up`/`<name>Down` from the table uncertainties.
    pub fn set_use_errors(&mut self, use_errors: bool) {
        self.use_errors = use_errors;
    }

    fn photon_pt(&self, ctx: &EventContext<'_>) -> Option<f64> {
        match self.photon_type {
            PhotonType::Reco => ctx.output.photons.first().map(|p| p.pt),
            PhotonType::PostShower => leading_gen_photon(&ctx.input.gen_particles, false),
            PhotonType::Parton => leading_gen_photon(&ctx.input.gen_particles, true),
        }
    }
}

impl Operator for PhotonPtWeight {
    operator_common!("PhotonPtWeight");
    weight_only!();

    fn variation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variations.iter().map(|(n, _)| n.clone()).collect();
        if self.use_errors {
            names.push(format!("{}Up", self.name()));
            names.push(format!("{}Down", self.name()));
        }
        names
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(pt) = self.photon_pt(ctx) else {
            return Evaluation::weight(1.0);
        };
        let vars = [pt];
        let nominal = self.table.lookup(&vars);
        let mut eval = Evaluation::weight(nominal);
        for (name, source) in &self.variations {
            let value = match source {
                VariationSource::Table(table) => table.lookup(&vars),
                VariationSource::Entry(table, entry) => {
                    table.lookup_variation(&vars, entry).unwrap_or(nominal)
                }
            };
            eval = eval.with_variation(name.clone(), value);
        }
        if self.use_errors {
            let err = self.table.uncertainty(&vars);
            eval = eval
                .with_variation(format!("{}Up", self.name()), nominal + err)
                .with_variation(format!("{}Down", self.name()), nominal - err);
        }
        eval
    }
}

/// PDF uncertainty from the spread of the NNPDF replica weights.
pub struct NnpdfVariation {
    core: OperatorCore,
}

impl NnpdfVariation {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("NNPDFVariation") }
    }
}

impl Default for NnpdfVariation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for NnpdfVariation {
    operator_common!("NnpdfVariation");
    weight_only!();

    fn variation_names(&self) -> Vec<String> {
        vec!["pdfUp".into(), "pdfDown".into()]
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let w = &ctx.input.pdf_weights;
        let spread = if w.len() < 2 {
            0.0
        } else {
            let n = w.len() as f64;
            let mean = w.iter().sum::<f64>() / n;
            (w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        Evaluation::weight(1.0)
            .with_variation("pdfUp", 1.0 + spread)
            .with_variation("pdfDown", 1.0 - spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::operators::testing::{good_photon, tight_lepton};
    use approx::assert_relative_eq;

    /// Linear in the first variable, with a flat uncertainty.
    struct Ramp {
        slope: f64,
        err: f64,
    }

    impl Lookup for Ramp {
        fn dimension(&self) -> usize {
            1
        }

        fn lookup(&self, vars: &[f64]) -> f64 {
            self.slope * vars[0]
        }

        fn uncertainty(&self, _vars: &[f64]) -> f64 {
            self.err
        }
    }

    fn ramp(slope: f64, err: f64) -> Arc<dyn Lookup> {
        Arc::new(Ramp { slope, err })
    }

    #[test]
    fn constant_and_pileup() {
        let ev = Event { true_pileup: 20.0, ..Event::default() };
        let mut ctx = EventContext::new(&ev);

        let mut xs = ConstantWeight::new(0.01, "crosssection");
        xs.add_variation("lumiUp", 0.011);
        let e = xs.evaluate(&mut ctx);
        assert_eq!(e.weight, Some(0.01));
        assert_eq!(e.variations["lumiUp"], 0.011);
        assert_eq!(xs.variation_names(), vec!["lumiUp".to_string()]);
        assert!(!xs.produces_decision() && xs.produces_weight());

        let pu = PuWeight::new(ramp(0.05, 0.0));
        assert_eq!(pu.name(), "PUWeight");
        assert_relative_eq!(pu.evaluate(&mut ctx).weight.unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn id_scale_factors_per_object() {
        let ev = Event { npv: 10, ..Event::default() };
        let mut ctx = EventContext::new(&ev);
        ctx.output.muons = vec![tight_lepton(50.0, 1.0, 0.0, 1), tight_lepton(20.0, -2.0, 1.0, -1)];

        let mut sf = IdSfWeight::new(Collection::Muons, "MuonSF");
        sf.add_factor(ramp(0.01, 0.1));
        sf.add_factor(ramp(0.02, 0.0));
        sf.set_n_particles(2);
        // 0.5 * 0.4
        let e = sf.evaluate(&mut ctx);
        assert_relative_eq!(e.weight.unwrap(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(e.variations["MuonSFUp"], 0.6 * 0.4, epsilon = 1e-12);
        assert_relative_eq!(e.variations["MuonSFDown"], 0.4 * 0.4, epsilon = 1e-12);

        let mut track = IdSfWeight::new(Collection::Muons, "MuonTrackSF");
        track.add_factor(ramp(0.1, 0.0));
        track.set_variable(SfVariable::Npv, None);
        assert_relative_eq!(track.evaluate(&mut ctx).weight.unwrap(), 1.0, epsilon = 1e-12);

        let mut eta = IdSfWeight::new(Collection::Muons, "Eta");
        eta.add_factor(ramp(1.0, 0.0));
        eta.set_n_particles(2);
        eta.set_variable(SfVariable::AbsEta, Some(SfVariable::Pt));
        assert_relative_eq!(eta.evaluate(&mut ctx).weight.unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn photon_pt_weight_variants() {
        let ev = Event {
            gen_particles: vec![GenParticle {
                pdg_id: 22,
                pt: 300.0,
                final_state: true,
                ..GenParticle::default()
            }],
            ..Event::default()
        };
        let mut ctx = EventContext::new(&ev);

        let mut w = PhotonPtWeight::new(ramp(0.01, 0.5), "hadProxyWeight");
        w.add_variation("purityUp", ramp(0.02, 0.0));
        w.set_use_errors(true);
        assert_eq!(w.variation_names(), vec!["purityUp", "hadProxyWeightUp", "hadProxyWeightDown"]);

        // no selected photon: neutral factor
        assert_eq!(w.evaluate(&mut ctx).weight, Some(1.0));

        ctx.output.photons.push(good_photon(200.0));
        let e = w.evaluate(&mut ctx);
        assert_relative_eq!(e.weight.unwrap(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(e.variations["purityUp"], 4.0, epsilon = 1e-12);
        assert_relative_eq!(e.variations["hadProxyWeightDown"], 1.5, epsilon = 1e-12);

        w.set_photon_type(PhotonType::PostShower);
        assert_relative_eq!(w.evaluate(&mut ctx).weight.unwrap(), 3.0, epsilon = 1e-12);
        w.set_photon_type(PhotonType::Parton);
        assert_eq!(w.evaluate(&mut ctx).weight, Some(1.0));
    }

    /// Nominal 1.2 with a single alternate `renUp` of 1.5.
    struct Scales;

    impl Lookup for Scales {
        fn dimension(&self) -> usize {
            1
        }

        fn lookup(&self, _vars: &[f64]) -> f64 {
            1.2
        }
    }

    impl VariationLookup for Scales {
        fn variation_names(&self) -> Vec<String> {
            vec!["renUp".into()]
        }

        fn lookup_variation(&self, _vars: &[f64], variation: &str) -> Option<f64> {
            (variation == "renUp").then_some(1.5)
        }
    }

    #[test]
    fn photon_pt_weight_reads_named_alternates() {
        let ev = Event::default();
        let mut ctx = EventContext::new(&ev);
        ctx.output.photons.push(good_photon(200.0));

        let table = Arc::new(Scales);
        let mut w = PhotonPtWeight::new(table.clone(), "QCDCorrection");
        w.add_table_variation("qcdrenUp", table.clone(), "renUp");
        w.add_table_variation("qcdfacUp", table, "facUp");
        assert_eq!(w.variation_names(), vec!["qcdrenUp", "qcdfacUp"]);

        let e = w.evaluate(&mut ctx);
        assert_eq!(e.weight, Some(1.2));
        assert_eq!(e.variations["qcdrenUp"], 1.5);
        // missing entry falls back to the nominal
        assert_eq!(e.variations["qcdfacUp"], 1.2);
    }

    #[test]
    fn pdf_spread() {
        let ev = Event { pdf_weights: vec![0.9, 1.1, 0.9, 1.1], ..Event::default() };
        let mut ctx = EventContext::new(&ev);
        let e = NnpdfVariation::new().evaluate(&mut ctx);
        let sigma = (0.04_f64 / 3.0).sqrt();
        assert_eq!(e.weight, Some(1.0));
        assert_relative_eq!(e.variations["pdfUp"], 1.0 + sigma, epsilon = 1e-12);

        let flat = Event::default();
        let mut ctx = EventContext::new(&flat);
        assert_eq!(NnpdfVariation::new().evaluate(&mut ctx).variations["pdfDown"], 1.0);
    }
}
