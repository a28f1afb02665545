//! Tag-and-probe pairings for efficiency and fake-rate measurements.

use mx_core::Evaluation;
use serde::{Deserialize, Serialize};

use crate::context::{EventContext, Product, ZCandidate};
use crate::event::{Collection, Kinematic, Lepton, Photon, delta_phi, delta_r};
use crate::operator::{Operator, OperatorCore, OperatorHandle};
use crate::operator_common;

const Z_WINDOW: (f64, f64) = (60.0, 120.0);

/// Massless four-momentum (E, px, py, pz).
fn four_momentum(obj: &impl Kinematic) -> [f64; 4] {
    let (pt, eta, phi) = (obj.pt(), obj.eta(), obj.phi());
    [pt * eta.cosh(), pt * phi.cos(), pt * phi.sin(), pt * eta.sinh()]
}

fn add(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn mass(p: [f64; 4]) -> f64 {
    (p[0] * p[0] - p[1] * p[1] - p[2] * p[2] - p[3] * p[3]).max(0.0).sqrt()
}

fn leptons<'e>(ctx: &EventContext<'e>, species: Collection) -> &'e [Lepton] {
    match species {
        Collection::Muons => &ctx.input.muons,
        _ => &ctx.input.electrons,
    }
}

fn store(ctx: &mut EventContext<'_>, species: Collection, selected: Vec<Lepton>) {
    match species {
        Collection::Muons => ctx.output.muons = selected,
        _ => ctx.output.electrons = selected,
    }
}

/// Builds an opposite-charge tag-probe lepton pair in the Z window and
/// publishes it as a [`ZCandidate`].
pub struct TagAndProbePairZ {
    core: OperatorCore,
    tag_species: Collection,
    probe_species: Collection,
    min_tag_pt: f64,
    min_probe_pt: f64,
}

impl TagAndProbePairZ {
    /// Electron tag, electron probe.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("TagAndProbePairZ"),
            tag_species: Collection::Electrons,
            probe_species: Collection::Electrons,
            min_tag_pt: 30.0,
            min_probe_pt: 20.0,
        }
    }

    /// Tag collection (electrons or muons).
    pub fn set_tag_species(&mut self, species: Collection) {
        self.tag_species = species;
    }

    /// Probe collection (electrons or muons).
    pub fn set_probe_species(&mut self, species: Collection) {
        self.probe_species = species;
    }

    fn find(&self, ctx: &EventContext<'_>) -> Option<(Lepton, Lepton, ZCandidate)> {
        let tags = leptons(ctx, self.tag_species);
        let probes = leptons(ctx, self.probe_species);
        for tag in tags.iter().filter(|l| l.tight && l.trigger_match && l.pt > self.min_tag_pt) {
            for probe in probes.iter().filter(|l| l.loose && l.pt > self.min_probe_pt) {
                if std::ptr::eq(tag, probe) || tag.charge * probe.charge >= 0 {
                    continue;
                }
                let p = add(four_momentum(tag), four_momentum(probe));
                let m = mass(p);
                if m > Z_WINDOW.0 && m < Z_WINDOW.1 {
                    let pt = p[1].hypot(p[2]);
                    let eta = if pt > 0.0 { (p[3] / pt).asinh() } else { 0.0 };
                    let z = ZCandidate { pt, eta, phi: p[2].atan2(p[1]), mass: m };
                    return Some((tag.clone(), probe.clone(), z));
                }
            }
        }
        None
    }
}

impl Default for TagAndProbePairZ {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for TagAndProbePairZ {
    operator_common!("TagAndProbePairZ");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some((tag, probe, z)) = self.find(ctx) else {
            return Evaluation::decision(false);
        };
        if self.tag_species == self.probe_species {
            store(ctx, self.tag_species, vec![tag, probe]);
        } else {
            store(ctx, self.tag_species, vec![tag]);
            store(ctx, self.probe_species, vec![probe]);
        }
        ctx.set_observable("zMass", z.mass);
        ctx.set_observable("zPt", z.pt);
        ctx.publish(self.id(), Product::ZCandidate(z));
        Evaluation::decision(true)
    }
}

/// Requires a hard jet recoiling against the Z candidate of a
/// [`TagAndProbePairZ`].
pub struct ZJetBackToBack {
    core: OperatorCore,
    pair: OperatorHandle,
    min_jet_pt: f64,
    min_delta_phi: f64,
}

impl ZJetBackToBack {
    /// Jet above 100 GeV at dPhi > 3.0 from the pair.
    pub fn new(pair: OperatorHandle) -> Self {
        Self {
            core: OperatorCore::new("ZJetBackToBack"),
            pair,
            min_jet_pt: 100.0,
            min_delta_phi: 3.0,
        }
    }

    /// Jet pT threshold.
    pub fn set_min_jet_pt(&mut self, pt: f64) {
        self.min_jet_pt = pt;
    }

    /// Minimum Z-jet azimuthal separation.
    pub fn set_min_delta_phi(&mut self, dphi: f64) {
        self.min_delta_phi = dphi;
    }
}

impl Operator for ZJetBackToBack {
    operator_common!("ZJetBackToBack");

    fn dependencies(&self) -> Vec<OperatorHandle> {
        vec![self.pair.clone()]
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(z) = ctx.z_candidate(&self.pair) else {
            return Evaluation::decision(false);
        };
        let back_to_back = ctx
            .output
            .jets
            .iter()
            .any(|j| j.pt > self.min_jet_pt && delta_phi(j.phi, z.phi) > self.min_delta_phi);
        Evaluation::decision(back_to_back)
    }
}

/// Number of tag leptons in a lepton-photon pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagProbeMode {
    /// One tag lepton.
    #[default]
    Single,
    /// Two opposite-charge tag leptons (FSR photon probe).
    Double,
}

/// Pairs a tag lepton with a probe photon.
///
/// Records the tag-probe (or tag-tag-probe) mass as `tpMass`.
pub struct TagProbePhoton {
    core: OperatorCore,
    species: Collection,
    mode: TagProbeMode,
    min_tag_pt: f64,
    min_probe_pt: f64,
    tag_trigger_match: bool,
}

impl TagProbePhoton {
    fn with_species(name: &str, species: Collection) -> Self {
        Self {
            core: OperatorCore::new(name),
            species,
            mode: TagProbeMode::Single,
            min_tag_pt: 100.0,
            min_probe_pt: 175.0,
            tag_trigger_match: false,
        }
    }

    /// Electron tag.
    pub fn electron() -> Self {
        Self::with_species("TPElectronPhoton", Collection::Electrons)
    }

    /// Muon tag.
    pub fn muon() -> Self {
        Self::with_species("TPMuonPhoton", Collection::Muons)
    }

    /// Single or double tag.
    pub fn set_mode(&mut self, mode: TagProbeMode) {
        self.mode = mode;
    }

    /// Tag pT threshold.
    pub fn set_min_tag_pt(&mut self, pt: f64) {
        self.min_tag_pt = pt;
    }

    /// Probe pT threshold.
    pub fn set_min_probe_pt(&mut self, pt: f64) {
        self.min_probe_pt = pt;
    }

    /// Require the tag to be trigger-matched.
    pub fn set_tag_trigger_match(&mut self, required: bool) {
        self.tag_trigger_match = required;
    }

    fn tags(&self, ctx: &EventContext<'_>) -> Vec<Lepton> {
        leptons(ctx, self.species)
            .iter()
            .filter(|l| l.tight && l.pt > self.min_tag_pt)
            .filter(|l| !self.tag_trigger_match || l.trigger_match)
            .cloned()
            .collect()
    }
}

impl Operator for TagProbePhoton {
    operator_common!("TagProbePhoton");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let mut tags = self.tags(ctx);
        match self.mode {
            TagProbeMode::Single => tags.truncate(1),
            TagProbeMode::Double => {
                let lead_charge = tags.first().map_or(0, |l| l.charge);
                let partner = tags.iter().skip(1).find(|l| l.charge * lead_charge < 0).cloned();
                let Some(partner) = partner else {
                    return Evaluation::decision(false);
                };
                tags.truncate(1);
                tags.push(partner);
            }
        }
        if tags.is_empty() {
            return Evaluation::decision(false);
        }

        let probe: Option<Photon> = ctx
            .input
            .photons
            .iter()
            .find(|ph| {
                ph.pt > self.min_probe_pt
                    && ph.eta.abs() < 1.4442
                    && tags.iter().all(|t| delta_r(*ph, t) > 0.5)
            })
            .cloned();
        let Some(probe) = probe else {
            return Evaluation::decision(false);
        };

        let system = tags.iter().fold(four_momentum(&probe), |p, t| add(p, four_momentum(t)));
        ctx.set_observable("tpMass", mass(system));
        ctx.output.photons = vec![probe];
        store(ctx, self.species, tags);
        Evaluation::decision(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Jet, invariant_mass};
    use crate::operator::OperatorId;
    use crate::operators::testing::{good_photon, tight_lepton};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn zee() -> Event {
        Event {
            electrons: vec![tight_lepton(50.0, 0.5, 0.3, 1), tight_lepton(40.0, -0.5, 3.1, -1)],
            ..Event::default()
        }
    }

    #[test]
    fn z_pair_and_recoil() {
        let ev = zee();
        let mut ctx = EventContext::new(&ev);
        let mut pair = TagAndProbePairZ::new();
        pair.core.assign_id(OperatorId::next());
        assert_eq!(pair.evaluate(&mut ctx).decision, Some(true));
        let expected = invariant_mass(&ev.electrons[0], &ev.electrons[1]);
        assert_relative_eq!(ctx.output.observables["zMass"], expected, epsilon = 1e-9);
        assert_eq!(ctx.output.electrons.len(), 2);

        let handle = OperatorHandle::new(pair.id(), pair.name());
        let z_phi = ctx.z_candidate(&handle).unwrap().phi;
        let b2b = ZJetBackToBack::new(handle.clone());
        assert_eq!(b2b.dependencies(), vec![handle]);

        ctx.output.jets = vec![Jet { pt: 150.0, eta: 0.0, phi: z_phi + PI, csv: 0.0 }];
        assert_eq!(b2b.evaluate(&mut ctx).decision, Some(true));
        ctx.output.jets[0].phi = z_phi + 0.5;
        assert_eq!(b2b.evaluate(&mut ctx).decision, Some(false));
        ctx.output.jets[0] = Jet { pt: 80.0, eta: 0.0, phi: z_phi + PI, csv: 0.0 };
        assert_eq!(b2b.evaluate(&mut ctx).decision, Some(false));
    }

    #[test]
    fn same_sign_or_muon_pair_fails() {
        let mut ev = zee();
        ev.electrons[1].charge = 1;
        let mut ctx = EventContext::new(&ev);
        assert_eq!(TagAndProbePairZ::new().evaluate(&mut ctx).decision, Some(false));

        let mut mm = TagAndProbePairZ::new();
        mm.set_tag_species(Collection::Muons);
        mm.set_probe_species(Collection::Muons);
        assert_eq!(mm.evaluate(&mut EventContext::new(&zee())).decision, Some(false));
    }

    #[test]
    fn electron_photon_pair() {
        let ev = Event {
            electrons: vec![tight_lepton(200.0, 0.3, 1.0 + PI, -1)],
            photons: vec![good_photon(200.0)],
            ..Event::default()
        };
        let mut ctx = EventContext::new(&ev);
        let tp = TagProbePhoton::electron();
        assert_eq!(tp.name(), "TPElectronPhoton");
        assert_eq!(tp.evaluate(&mut ctx).decision, Some(true));
        assert_relative_eq!(ctx.output.observables["tpMass"], 400.0, epsilon = 1e-6);

        let mut low = TagProbePhoton::electron();
        low.set_min_probe_pt(25.0);
        low.set_min_tag_pt(30.0);
        low.set_tag_trigger_match(true);
        let mut untriggered = ev.clone();
        untriggered.electrons[0].trigger_match = false;
        assert_eq!(low.evaluate(&mut EventContext::new(&untriggered)).decision, Some(false));
    }

    #[test]
    fn double_muon_mode_needs_opposite_pair() {
        let ev = Event {
            muons: vec![tight_lepton(150.0, 0.0, 2.0, 1), tight_lepton(120.0, 0.5, -2.0, 1)],
            photons: vec![good_photon(200.0)],
            ..Event::default()
        };
        let mut tp = TagProbePhoton::muon();
        tp.set_mode(TagProbeMode::Double);
        assert_eq!(tp.evaluate(&mut EventContext::new(&ev)).decision, Some(false));

        let mut ev = ev;
        ev.muons[1].charge = -1;
        let mut ctx = EventContext::new(&ev);
        assert_eq!(tp.evaluate(&mut ctx).decision, Some(true));
        assert_eq!(ctx.output.muons.len(), 2);
        assert!(ctx.output.observables["tpMass"] > 0.0);
    }
}
