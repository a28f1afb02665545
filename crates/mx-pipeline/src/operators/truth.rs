//! Generator-level stages (simulation only).

use mx_core::Evaluation;

use crate::context::EventContext;
use crate::event::{GenParticle, delta_r};
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

const PHOTON: i32 = 22;

fn is_parton(p: &GenParticle) -> bool {
    p.hard_process && (p.pdg_id.abs() <= 6 || p.pdg_id == 21)
}

fn leading_photon(particles: &[GenParticle]) -> Option<&GenParticle> {
    particles
        .iter()
        .filter(|p| p.pdg_id == PHOTON && p.final_state)
        .max_by(|a, b| a.pt.total_cmp(&b.pt))
}

/// Rejects events with an isolated hard generator photon, removing the
/// overlap between inclusive and photon-enriched samples.
pub struct GenPhotonVeto {
    core: OperatorCore,
    min_pt: f64,
    min_parton_dr: f64,
}

impl GenPhotonVeto {
    /// Veto photons above 130 GeV with no parton within dR 0.5.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("GenPhotonVeto"), min_pt: 130.0, min_parton_dr: 0.5 }
    }

    /// Photon pT threshold.
    pub fn set_min_pt(&mut self, pt: f64) {
        self.min_pt = pt;
    }

    /// Photon-parton separation above which a photon counts as isolated.
    pub fn set_min_parton_dr(&mut self, dr: f64) {
        self.min_parton_dr = dr;
    }
}

impl Default for GenPhotonVeto {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for GenPhotonVeto {
    operator_common!("GenPhotonVeto");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let gen_particles = &ctx.input.gen_particles;
        let isolated = gen_particles
            .iter()
            .filter(|p| p.pdg_id == PHOTON && p.final_state && p.pt > self.min_pt)
            .any(|ph| {
                gen_particles
                    .iter()
                    .filter(|p| is_parton(p))
                    .all(|parton| delta_r(ph, parton) > self.min_parton_dr)
            });
        Evaluation::decision(!isolated)
    }
}

/// Drops events whose leading generator photon is above a pT ceiling, to
/// stitch a pT-binned sample onto an inclusive one.
pub struct PhotonPtTruncator {
    core: OperatorCore,
    pt_max: f64,
}

impl PhotonPtTruncator {
    /// Ceiling at 500 GeV.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("PhotonPtTruncator"), pt_max: 500.0 }
    }

    /// Ceiling (GeV).
    pub fn set_pt_max(&mut self, pt: f64) {
        self.pt_max = pt;
    }
}

impl Default for PhotonPtTruncator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PhotonPtTruncator {
    operator_common!("PhotonPtTruncator");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let pt = leading_photon(&ctx.input.gen_particles).map_or(0.0, |p| p.pt);
        Evaluation::decision(pt < self.pt_max)
    }
}

/// Requires a final-state generator particle of one species in acceptance.
pub struct GenParticleSelection {
    core: OperatorCore,
    pdg_id: i32,
    min_pt: f64,
    max_eta: f64,
}

impl GenParticleSelection {
    /// Any final-state photon.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            core: OperatorCore::new(name),
            pdg_id: PHOTON,
            min_pt: 0.0,
            max_eta: f64::INFINITY,
        }
    }

    /// Species (|PDG id|).
    pub fn set_pdg_id(&mut self, pdg_id: i32) {
        self.pdg_id = pdg_id;
    }

    /// pT threshold.
    pub fn set_min_pt(&mut self, pt: f64) {
        self.min_pt = pt;
    }

    /// |eta| ceiling.
    pub fn set_max_eta(&mut self, eta: f64) {
        self.max_eta = eta;
    }
}

impl Operator for GenParticleSelection {
    operator_common!("GenParticleSelection");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let found = ctx.input.gen_particles.iter().any(|p| {
            p.final_state
                && p.pdg_id.abs() == self.pdg_id.abs()
                && p.pt > self.min_pt
                && p.eta.abs() < self.max_eta
        });
        Evaluation::decision(found)
    }
}

/// Filters W decays by the flavour of the charged lepton.
///
/// Rejects events with a hard-process lepton of `rejected_pdg`; when
/// `accepted_pdg` is set, additionally requires one of that flavour.
pub struct LeptonicDecayFilter {
    core: OperatorCore,
    rejected_pdg: i32,
    accepted_pdg: Option<i32>,
}

impl LeptonicDecayFilter {
    /// Reject electron decays.
    pub fn named(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name), rejected_pdg: 11, accepted_pdg: None }
    }

    /// Flavour to reject (|PDG id|, 0 rejects nothing).
    pub fn set_rejected_pdg_id(&mut self, pdg_id: i32) {
        self.rejected_pdg = pdg_id;
    }

    /// Flavour to require (|PDG id|).
    pub fn set_accepted_pdg_id(&mut self, pdg_id: i32) {
        self.accepted_pdg = Some(pdg_id);
    }
}

impl Operator for LeptonicDecayFilter {
    operator_common!("LeptonicDecayFilter");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let has = |id: i32| {
            ctx.input.gen_particles.iter().any(|p| p.hard_process && p.pdg_id.abs() == id)
        };
        let rejected = self.rejected_pdg != 0 && has(self.rejected_pdg);
        let accepted = self.accepted_pdg.is_none_or(has);
        Evaluation::decision(!rejected && accepted)
    }
}

/// Records the distance between the selected photon and the nearest
/// generator photon.
pub struct GenPhotonDr {
    core: OperatorCore,
}

impl GenPhotonDr {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("GenPhotonDR") }
    }
}

impl Default for GenPhotonDr {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for GenPhotonDr {
    operator_common!("GenPhotonDr");

    fn produces_decision(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(photon) = ctx.output.photons.first() else {
            return Evaluation::neutral();
        };
        let nearest = ctx
            .input
            .gen_particles
            .iter()
            .filter(|p| p.pdg_id == PHOTON && p.final_state)
            .map(|p| delta_r(photon, p))
            .reduce(f64::min);
        if let Some(dr) = nearest {
            ctx.set_observable("genPhotonDR", dr);
        }
        Evaluation::neutral()
    }
}
