//! Jet cleaning and jet-based requirements.

use mx_core::Evaluation;

use crate::context::EventContext;
use crate::event::{Collection, Jet, Kinematic, delta_r};
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

/// Copies jets with pT > 30 GeV that do not overlap (dR < 0.4) with the
/// selected objects of the enabled collections into the output.
pub struct JetCleaning {
    core: OperatorCore,
    clean_against: Vec<(Collection, bool)>,
    min_pt: f64,
}

impl JetCleaning {
    /// Clean against photons, electrons, muons and taus.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("JetCleaning"),
            clean_against: vec![
                (Collection::Photons, true),
                (Collection::Electrons, true),
                (Collection::Muons, true),
                (Collection::Taus, true),
            ],
            min_pt: 30.0,
        }
    }

    /// Enable or disable overlap removal against one collection.
    pub fn set_clean_against(&mut self, collection: Collection, enabled: bool) {
        match self.clean_against.iter_mut().find(|(c, _)| *c == collection) {
            Some(slot) => slot.1 = enabled,
            None => self.clean_against.push((collection, enabled)),
        }
    }

    /// Whether overlap removal against `collection` is enabled.
    pub fn cleans_against(&self, collection: Collection) -> bool {
        self.clean_against.iter().any(|&(c, on)| c == collection && on)
    }

    fn overlaps(&self, jet: &Jet, ctx: &EventContext<'_>) -> bool {
        self.clean_against.iter().filter(|(_, on)| *on).any(|&(c, _)| match c {
            Collection::Photons => ctx.output.photons.iter().any(|o| close(jet, o)),
            Collection::Electrons => ctx.output.electrons.iter().any(|o| close(jet, o)),
            Collection::Muons => ctx.output.muons.iter().any(|o| close(jet, o)),
            Collection::Taus => ctx.input.taus.iter().any(|o| close(jet, o)),
            Collection::Jets => false,
        })
    }
}

fn close(jet: &Jet, obj: &impl Kinematic) -> bool {
    delta_r(jet, obj) < 0.4
}

impl Default for JetCleaning {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for JetCleaning {
    operator_common!("JetCleaning");

    fn produces_decision(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let jets: Vec<Jet> = ctx
            .input
            .jets
            .iter()
            .filter(|j| j.pt > self.min_pt && j.eta.abs() < 4.7 && !self.overlaps(j, ctx))
            .cloned()
            .collect();
        ctx.set_observable("nJets", jets.len() as f64);
        ctx.output.jets = jets;
        Evaluation::neutral()
    }
}

/// Rejects events with a b-tagged cleaned jet.
pub struct BjetVeto {
    core: OperatorCore,
    csv_cut: f64,
}

impl BjetVeto {
    /// Medium CSV working point.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("BjetVeto"), csv_cut: 0.8 }
    }
}

impl Default for BjetVeto {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for BjetVeto {
    operator_common!("BjetVeto");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let tagged = ctx.output.jets.iter().any(|j| j.eta.abs() < 2.4 && j.csv > self.csv_cut);
        Evaluation::decision(!tagged)
    }
}

/// Requires between `n_min` and `n_max` cleaned jets above a pT threshold.
pub struct HighPtJetSelection {
    core: OperatorCore,
    pt_cut: f64,
    n_min: usize,
    n_max: Option<usize>,
}

impl HighPtJetSelection {
    /// At least one jet above 100 GeV.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("HighPtJetSelection"),
            pt_cut: 100.0,
            n_min: 1,
            n_max: None,
        }
    }

    /// Jet pT threshold.
    pub fn set_jet_pt_cut(&mut self, pt: f64) {
        self.pt_cut = pt;
    }

    /// Minimum number of jets.
    pub fn set_n_min(&mut self, n: usize) {
        self.n_min = n;
    }

    /// Maximum number of jets.
    pub fn set_n_max(&mut self, n: usize) {
        self.n_max = Some(n);
    }
}

impl Default for HighPtJetSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for HighPtJetSelection {
    operator_common!("HighPtJetSelection");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let n = ctx.output.jets.iter().filter(|j| j.pt > self.pt_cut).count();
        Evaluation::decision(n >= self.n_min && self.n_max.is_none_or(|max| n <= max))
    }
}
