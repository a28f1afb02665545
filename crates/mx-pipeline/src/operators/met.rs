//! Missing-energy stages: copy, systematic shifts, thresholds and angles.

use mx_core::Evaluation;
use serde::{Deserialize, Serialize};

use crate::context::{EventContext, MetShift, MetShifts, Product};
use crate::event::{Jet, MetVector, delta_phi, transverse_mass};
use crate::operator::{Operator, OperatorCore, OperatorHandle};
use crate::operator_common;

/// Which MET an operator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetSource {
    /// The output MET (after recoil corrections).
    #[default]
    Output,
    /// The reconstructed MET of the input event.
    Input,
}

impl MetSource {
    fn read(self, ctx: &EventContext<'_>) -> MetVector {
        match self {
            MetSource::Output => ctx.output.met,
            MetSource::Input => ctx.input.met.vector(),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            MetSource::Output => "t1Met",
            MetSource::Input => "realMet",
        }
    }
}

/// Observable values for every shift published by `producer`.
fn shifted<F>(
    ctx: &EventContext<'_>,
    producer: Option<&OperatorHandle>,
    f: F,
) -> Vec<(MetShift, f64)>
where
    F: Fn(MetVector) -> f64,
{
    producer
        .and_then(|h| ctx.met_shifts(h))
        .map(|s| s.iter().map(|(shift, met)| (shift, f(met))).collect())
        .unwrap_or_default()
}

/// Copies the reconstructed MET into the output event.
pub struct CopyMet {
    core: OperatorCore,
}

impl CopyMet {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("CopyMet") }
    }
}

impl Default for CopyMet {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for CopyMet {
    operator_common!("CopyMet");

    fn produces_decision(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        ctx.output.met = ctx.input.met.vector();
        Evaluation::neutral()
    }
}

const PHOTON_SCALE_UNC: f64 = 0.015;

/// Computes the MET under jet-energy, photon-energy and unclustered-energy
/// shifts and publishes them for downstream angle computations.
pub struct MetVariations {
    core: OperatorCore,
    source: MetSource,
    photon_selection: Option<OperatorHandle>,
}

impl MetVariations {
    /// Shifts of the output MET.
    pub fn new() -> Self {
        Self::named("MetVariations")
    }

    /// Same as [`new`](Self::new) with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name), source: MetSource::Output, photon_selection: None }
    }

    /// MET to shift.
    pub fn set_met_source(&mut self, source: MetSource) {
        self.source = source;
    }

    /// Photon selection whose candidate carries the photon-energy shift.
    pub fn set_photon_selection(&mut self, handle: OperatorHandle) {
        self.photon_selection = Some(handle);
    }
}

impl Default for MetVariations {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for MetVariations {
    operator_common!("MetVariations");

    fn produces_decision(&self) -> bool {
        false
    }

    fn dependencies(&self) -> Vec<OperatorHandle> {
        self.photon_selection.iter().cloned().collect()
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let base = self.source.read(ctx);
        let met = &ctx.input.met;
        let nominal = met.vector();
        let apply = |alt: Option<MetVector>| match alt {
            Some(v) => MetVector::from_xy(
                base.px() + v.px() - nominal.px(),
                base.py() + v.py() - nominal.py(),
            ),
            None => base,
        };

        let mut shifts = MetShifts::default();
        shifts.insert(MetShift::JecUp, apply(met.jec_up));
        shifts.insert(MetShift::JecDown, apply(met.jec_down));
        shifts.insert(MetShift::UnclUp, apply(met.unclustered_up));
        shifts.insert(MetShift::UnclDown, apply(met.unclustered_down));

        // The photon shift only applies to a candidate the selection accepted.
        let photon = self
            .photon_selection
            .as_ref()
            .filter(|h| ctx.decision_of(h) == Some(true))
            .and_then(|_| ctx.output.photons.first());
        let (gec_up, gec_down) = match photon {
            Some(ph) => {
                (base.add_scaled(ph, -PHOTON_SCALE_UNC), base.add_scaled(ph, PHOTON_SCALE_UNC))
            }
            None => (base, base),
        };
        shifts.insert(MetShift::GecUp, gec_up);
        shifts.insert(MetShift::GecDown, gec_down);

        let prefix = self.source.prefix();
        for (shift, m) in shifts.iter() {
            ctx.set_observable(format!("{prefix}{}", shift.as_str()), m.pt);
        }
        ctx.publish(self.id(), Product::MetShifts(shifts));
        Evaluation::neutral()
    }
}

/// MET above a threshold.
pub struct HighMet {
    core: OperatorCore,
    threshold: f64,
    source: MetSource,
}

impl HighMet {
    /// Output MET above 170 GeV.
    pub fn new() -> Self {
        Self::named("HighMet")
    }

    /// Same as [`new`](Self::new) with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { core: OperatorCore::new(name), threshold: 170.0, source: MetSource::Output }
    }

    /// Threshold (GeV).
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Current threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// MET to cut on.
    pub fn set_met_source(&mut self, source: MetSource) {
        self.source = source;
    }
}

impl Default for HighMet {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for HighMet {
    operator_common!("HighMet");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        Evaluation::decision(self.source.read(ctx).pt > self.threshold)
    }
}

/// Azimuthal separation between the photon candidate and the MET.
pub struct PhotonMetDPhi {
    core: OperatorCore,
    min: f64,
    met_variations: Option<OperatorHandle>,
}

impl PhotonMetDPhi {
    /// dPhi > 0.5.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("PhotonMetDPhi"), min: 0.5, met_variations: None }
    }

    /// Also record the angle for every shifted MET of `handle`.
    pub fn set_met_variations(&mut self, handle: OperatorHandle) {
        self.met_variations = Some(handle);
    }
}

impl Default for PhotonMetDPhi {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PhotonMetDPhi {
    operator_common!("PhotonMetDPhi");

    fn dependencies(&self) -> Vec<OperatorHandle> {
        self.met_variations.iter().cloned().collect()
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(phi) = ctx.output.photons.first().map(|p| p.phi) else {
            return Evaluation::decision(false);
        };
        let dphi = delta_phi(phi, ctx.output.met.phi);
        let alt = shifted(ctx, self.met_variations.as_ref(), |m| delta_phi(phi, m.phi));

        ctx.set_observable("photonMetDPhi", dphi);
        for (shift, v) in alt {
            ctx.set_observable(format!("photonMetDPhi{}", shift.as_str()), v);
        }
        Evaluation::decision(dphi > self.min)
    }
}

/// Minimum azimuthal separation between the MET and the leading four jets.
pub struct JetMetDPhi {
    core: OperatorCore,
    min: f64,
    source: MetSource,
    met_variations: Option<OperatorHandle>,
}

impl JetMetDPhi {
    /// min dPhi > 0.5 against the output MET.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("JetMetDPhi"),
            min: 0.5,
            source: MetSource::Output,
            met_variations: None,
        }
    }

    /// MET to compare against.
    pub fn set_met_source(&mut self, source: MetSource) {
        self.source = source;
    }

    /// Also record the angle for every shifted MET of `handle`.
    pub fn set_met_variations(&mut self, handle: OperatorHandle) {
        self.met_variations = Some(handle);
    }

    fn min_dphi(ctx: &EventContext<'_>, met_phi: f64) -> f64 {
        ctx.output
            .jets
            .iter()
            .filter(|j| j.pt > 30.0)
            .take(4)
            .map(|j| delta_phi(j.phi, met_phi))
            .fold(std::f64::consts::PI, f64::min)
    }
}

impl Default for JetMetDPhi {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for JetMetDPhi {
    operator_common!("JetMetDPhi");

    fn dependencies(&self) -> Vec<OperatorHandle> {
        self.met_variations.iter().cloned().collect()
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let view: &EventContext<'_> = ctx;
        let dphi = Self::min_dphi(view, self.source.read(view).phi);
        let alt = shifted(view, self.met_variations.as_ref(), |m| Self::min_dphi(view, m.phi));

        ctx.set_observable("minJetMetDPhi", dphi);
        for (shift, v) in alt {
            ctx.set_observable(format!("minJetMetDPhi{}", shift.as_str()), v);
        }
        Evaluation::decision(dphi > self.min)
    }
}

const PHOTON_JET_PT_MIN: f64 = 30.0;

/// Records the minimum azimuthal separation between the photon and the jets
/// above 30 GeV.
///
/// With MET variations attached, the angle is also recorded per shift. A
/// jet-energy shift rescales every jet pT by the shift's share of the jet
/// scalar sum before the threshold is applied; the other shifts leave the
/// jets untouched.
pub struct PhotonJetDPhi {
    core: OperatorCore,
    met_variations: Option<OperatorHandle>,
}

impl PhotonJetDPhi {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("PhotonJetDPhi"), met_variations: None }
    }

    /// Also record the angle for every shifted MET of `handle`.
    pub fn set_met_variations(&mut self, handle: OperatorHandle) {
        self.met_variations = Some(handle);
    }

    fn min_dphi(jets: &[Jet], photon_phi: f64, scale: f64) -> f64 {
        jets.iter()
            .filter(|j| j.pt * scale > PHOTON_JET_PT_MIN)
            .map(|j| delta_phi(j.phi, photon_phi))
            .fold(std::f64::consts::PI, f64::min)
    }

    /// Jet pT scale implied by `shifted` relative to the output MET.
    fn jet_scale(ctx: &EventContext<'_>, shift: MetShift, shifted: MetVector) -> f64 {
        let sign = match shift {
            MetShift::JecUp => 1.0,
            MetShift::JecDown => -1.0,
            _ => return 1.0,
        };
        let ht: f64 = ctx.output.jets.iter().map(|j| j.pt).sum();
        if ht <= 0.0 {
            return 1.0;
        }
        let nominal = ctx.output.met;
        let delta = (shifted.px() - nominal.px()).hypot(shifted.py() - nominal.py());
        1.0 + sign * delta / ht
    }
}

impl Default for PhotonJetDPhi {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PhotonJetDPhi {
    operator_common!("PhotonJetDPhi");

    fn produces_decision(&self) -> bool {
        false
    }

    fn dependencies(&self) -> Vec<OperatorHandle> {
        self.met_variations.iter().cloned().collect()
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(phi) = ctx.output.photons.first().map(|p| p.phi) else {
            return Evaluation::neutral();
        };
        let view: &EventContext<'_> = ctx;
        let jets = &view.output.jets;
        let dphi = Self::min_dphi(jets, phi, 1.0);
        let alt: Vec<(MetShift, f64)> = self
            .met_variations
            .as_ref()
            .and_then(|h| view.met_shifts(h))
            .map(|shifts| {
                shifts
                    .iter()
                    .map(|(shift, met)| {
                        (shift, Self::min_dphi(jets, phi, Self::jet_scale(view, shift, met)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        ctx.set_observable("photonJetDPhi", dphi);
        for (shift, v) in alt {
            ctx.set_observable(format!("photonJetDPhi{}", shift.as_str()), v);
        }
        Evaluation::neutral()
    }
}

/// Records the photon-MET transverse mass.
pub struct PhotonMt {
    core: OperatorCore,
}

impl PhotonMt {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("PhotonMt") }
    }
}

impl Default for PhotonMt {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PhotonMt {
    operator_common!("PhotonMt");

    fn produces_decision(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        if let Some(photon) = ctx.output.photons.first() {
            let mt = transverse_mass(photon, &ctx.output.met);
            ctx.set_observable("photonMt", mt);
        }
        Evaluation::neutral()
    }
}

/// Treats the second photon of a diphoton event as invisible: its momentum
/// is added to the output MET.
pub struct PhotonRecoil {
    core: OperatorCore,
}

impl PhotonRecoil {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("PhotonRecoil") }
    }
}

impl Default for PhotonRecoil {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PhotonRecoil {
    operator_common!("PhotonRecoil");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(invisible) = ctx.input.photons.get(1) else {
            return Evaluation::decision(false);
        };
        ctx.output.met = ctx.output.met.add_scaled(invisible, 1.0);
        ctx.set_observable("recoilPt", ctx.output.met.pt);
        Evaluation::decision(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Jet, Met};
    use crate::operator::OperatorId;
    use crate::operators::testing::good_photon;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn event() -> Event {
        Event {
            photons: vec![good_photon(200.0)],
            met: Met {
                pt: 200.0,
                phi: 1.0 + PI,
                jec_up: Some(MetVector::new(210.0, 1.0 + PI)),
                ..Met::default()
            },
            ..Event::default()
        }
    }

    #[test]
    fn variations_publish_shifts() {
        let ev = event();
        let mut ctx = EventContext::new(&ev);
        CopyMet::new().evaluate(&mut ctx);
        ctx.output.photons = ev.photons.clone();

        let mut vars = MetVariations::new();
        vars.core.assign_id(OperatorId::next());
        let ph_handle = OperatorHandle::new(OperatorId::next(), "PhotonSelection");
        vars.set_photon_selection(ph_handle.clone());
        assert_eq!(vars.dependencies(), vec![ph_handle.clone()]);
        ctx.record_decision(ph_handle.id(), Some(true));
        vars.evaluate(&mut ctx);

        let handle = OperatorHandle::new(vars.id(), vars.name());
        let shifts = ctx.met_shifts(&handle).unwrap();
        assert_relative_eq!(shifts.get(MetShift::JecUp).unwrap().pt, 210.0, epsilon = 1e-9);
        assert_relative_eq!(shifts.get(MetShift::JecDown).unwrap().pt, 200.0, epsilon = 1e-9);
        // photon opposite to MET: scaling it up raises the MET
        assert_relative_eq!(shifts.get(MetShift::GecUp).unwrap().pt, 203.0, epsilon = 1e-9);
        assert_relative_eq!(ctx.output.observables["t1MetGECDown"], 197.0, epsilon = 1e-9);

        let mut dphi = PhotonMetDPhi::new();
        dphi.set_met_variations(handle.clone());
        assert_eq!(dphi.evaluate(&mut ctx).decision, Some(true));
        assert_relative_eq!(ctx.output.observables["photonMetDPhi"], PI, epsilon = 1e-9);
        assert!(ctx.output.observables.contains_key("photonMetDPhiJECUp"));

        let mut jet_dphi = JetMetDPhi::new();
        jet_dphi.set_met_variations(handle);
        ctx.output.jets.push(Jet { pt: 50.0, eta: 0.0, phi: 1.0 + PI - 0.2, csv: 0.0 });
        assert_eq!(jet_dphi.evaluate(&mut ctx).decision, Some(false));
        assert_relative_eq!(ctx.output.observables["minJetMetDPhiJECUp"], 0.2, epsilon = 1e-9);
    }

    #[test]
    fn photon_shift_needs_an_accepted_candidate() {
        let ev = event();
        let mut ctx = EventContext::new(&ev);
        CopyMet::new().evaluate(&mut ctx);
        ctx.output.photons = ev.photons.clone();

        let mut vars = MetVariations::new();
        vars.core.assign_id(OperatorId::next());
        let ph_handle = OperatorHandle::new(OperatorId::next(), "PhotonSelection");
        vars.set_photon_selection(ph_handle.clone());
        ctx.record_decision(ph_handle.id(), Some(false));
        vars.evaluate(&mut ctx);

        assert_relative_eq!(ctx.output.observables["t1MetGECUp"], 200.0, epsilon = 1e-9);
        assert_relative_eq!(ctx.output.observables["t1MetGECDown"], 200.0, epsilon = 1e-9);
    }

    #[test]
    fn photon_jet_angle_follows_jet_energy_shifts() {
        // MET along +x, photon along -x; JEC up adds 10 GeV to the MET.
        let ev = Event {
            photons: vec![good_photon(200.0)],
            met: Met {
                pt: 100.0,
                phi: 0.0,
                jec_up: Some(MetVector::new(110.0, 0.0)),
                jec_down: Some(MetVector::new(90.0, 0.0)),
                ..Met::default()
            },
            ..Event::default()
        };
        let mut ctx = EventContext::new(&ev);
        CopyMet::new().evaluate(&mut ctx);
        ctx.output.photons = ev.photons.clone();
        ctx.output.photons[0].phi = PI;
        // HT = 100: the shifts scale jets by 1.1 and 0.9.
        ctx.output.jets = vec![
            Jet { pt: 72.0, eta: 0.0, phi: 0.0, csv: 0.0 },
            Jet { pt: 28.0, eta: 0.0, phi: PI - 0.3, csv: 0.0 },
        ];

        let mut vars = MetVariations::new();
        vars.core.assign_id(OperatorId::next());
        vars.evaluate(&mut ctx);
        let handle = OperatorHandle::new(vars.id(), vars.name());

        let mut dphi = PhotonJetDPhi::new();
        dphi.set_met_variations(handle.clone());
        assert_eq!(dphi.dependencies(), vec![handle]);
        assert_eq!(dphi.evaluate(&mut ctx).decision, None);

        let obs = &ctx.output.observables;
        assert_relative_eq!(obs["photonJetDPhi"], PI, epsilon = 1e-9);
        // 28 * 1.1 = 30.8 passes the threshold
        assert_relative_eq!(obs["photonJetDPhiJECUp"], 0.3, epsilon = 1e-9);
        assert_relative_eq!(obs["photonJetDPhiJECDown"], PI, epsilon = 1e-9);
        assert_relative_eq!(obs["photonJetDPhiUnclUp"], PI, epsilon = 1e-9);
    }

    #[test]
    fn high_met_sources() {
        let ev = event();
        let mut ctx = EventContext::new(&ev);
        let mut cut = HighMet::named("RealMetCut");
        cut.set_threshold(50.0);
        assert_eq!(cut.evaluate(&mut ctx).decision, Some(false));
        cut.set_met_source(MetSource::Input);
        assert_eq!(cut.evaluate(&mut ctx).decision, Some(true));
        assert_eq!(HighMet::new().threshold(), 170.0);
    }

    #[test]
    fn photon_recoil_adds_second_photon() {
        let mut ev = event();
        ev.met = Met::default();
        let mut second = good_photon(120.0);
        second.phi = 0.0;
        ev.photons.push(second);

        let mut ctx = EventContext::new(&ev);
        assert_eq!(PhotonRecoil::new().evaluate(&mut ctx).decision, Some(true));
        assert_relative_eq!(ctx.output.met.pt, 120.0, epsilon = 1e-9);

        ctx.output.photons.push(ev.photons[0].clone());
        PhotonMt::new().evaluate(&mut ctx);
        assert!(ctx.output.observables["photonMt"] > 0.0);

        let single = event();
        let mut ctx = EventContext::new(&single);
        assert_eq!(PhotonRecoil::new().evaluate(&mut ctx).decision, Some(false));
    }
}
