//! Event records: the reconstructed input event and the skim output event.
//!
//! Input records are deserialized from JSON (one event per line); the
//! output record is filled by operators as the pipeline runs and handed to
//! the writer together with the decision and weights.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Common kinematic accessors of reconstructed and generator objects.
pub trait Kinematic {
    /// Transverse momentum (GeV).
    fn pt(&self) -> f64;
    /// Pseudorapidity.
    fn eta(&self) -> f64;
    /// Azimuth (rad).
    fn phi(&self) -> f64;
}

macro_rules! impl_kinematic {
    ($($t:ty),*) => {
        $(impl Kinematic for $t {
            fn pt(&self) -> f64 { self.pt }
            fn eta(&self) -> f64 { self.eta }
            fn phi(&self) -> f64 { self.phi }
        })*
    };
}

/// A transverse-plane vector (missing energy, recoil).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetVector {
    /// Magnitude (GeV).
    pub pt: f64,
    /// Azimuth (rad).
    pub phi: f64,
}

impl MetVector {
    /// Build from magnitude and azimuth.
    pub fn new(pt: f64, phi: f64) -> Self {
        Self { pt, phi }
    }

    /// Build from Cartesian components.
    pub fn from_xy(px: f64, py: f64) -> Self {
        Self { pt: px.hypot(py), phi: py.atan2(px) }
    }

    /// x component.
    pub fn px(&self) -> f64 {
        self.pt * self.phi.cos()
    }

    /// y component.
    pub fn py(&self) -> f64 {
        self.pt * self.phi.sin()
    }

    /// Add `scale` times the transverse momentum of an object.
    pub fn add_scaled(self, obj: &impl Kinematic, scale: f64) -> Self {
        Self::from_xy(
            self.px() + scale * obj.pt() * obj.phi().cos(),
            self.py() + scale * obj.pt() * obj.phi().sin(),
        )
    }
}

/// Reconstructed missing transverse momentum with its energy-scale shifts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Met {
    /// Magnitude (GeV).
    pub pt: f64,
    /// Azimuth (rad).
    pub phi: f64,
    /// MET with jet energy corrections shifted up.
    pub jec_up: Option<MetVector>,
    /// MET with jet energy corrections shifted down.
    pub jec_down: Option<MetVector>,
    /// MET with unclustered energy shifted up.
    pub unclustered_up: Option<MetVector>,
    /// MET with unclustered energy shifted down.
    pub unclustered_down: Option<MetVector>,
}

impl Met {
    /// Nominal vector.
    pub fn vector(&self) -> MetVector {
        MetVector::new(self.pt, self.phi)
    }
}

/// Reconstructed photon with the identification inputs used by the selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Photon {
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Supercluster pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Hadronic over electromagnetic energy ratio.
    pub h_over_e: f64,
    /// sigma_ieta_ieta shower width.
    pub sieie: f64,
    /// sigma_iphi_iphi shower width.
    pub sipip: f64,
    /// Charged-hadron isolation (selected vertex).
    pub ch_iso: f64,
    /// Charged-hadron isolation (worst vertex).
    pub ch_iso_max: f64,
    /// Neutral-hadron isolation.
    pub nh_iso: f64,
    /// Photon isolation.
    pub ph_iso: f64,
    /// No pixel seed matched to the supercluster.
    pub pixel_veto: bool,
    /// Conversion-safe electron veto passed.
    pub csafe_veto: bool,
    /// Energy deposited in the muon system along the photon direction.
    pub mip_energy: f64,
    /// Seed crystal time (ns).
    pub time: f64,
}

/// Reconstructed electron or muon.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Lepton {
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Electric charge (+1/-1).
    pub charge: i32,
    /// Passes the loose identification.
    pub loose: bool,
    /// Passes the medium identification.
    pub medium: bool,
    /// Passes the tight identification.
    pub tight: bool,
    /// Fired the single-lepton trigger (trigger-matched).
    pub trigger_match: bool,
    /// Longitudinal impact parameter (cm).
    pub dz: f64,
}

/// Generic reconstructed object (hadronic taus).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Particle {
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
}

/// Reconstructed jet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Jet {
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// b-tagging discriminant.
    pub csv: f64,
}

/// Generator-level particle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenParticle {
    /// PDG identifier.
    pub pdg_id: i32,
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Stable final-state particle (after showering).
    pub final_state: bool,
    /// Outgoing particle of the hard process (LHE level).
    pub hard_process: bool,
}

impl_kinematic!(Photon, Lepton, Particle, Jet, GenParticle);

/// Outcome of the detector-noise MET filters (`true` = filter passed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetFilterFlags {
    /// Beam-halo filter.
    pub halo: bool,
    /// HCAL barrel/endcap noise filter.
    pub hbhe: bool,
    /// HCAL isolated-noise filter.
    pub hbhe_iso: bool,
    /// ECAL dead-cell trigger-primitive filter.
    pub ecal_dead_cell: bool,
    /// Bad endcap supercluster filter.
    pub bad_sc: bool,
    /// Good primary vertex present.
    pub good_vertices: bool,
}

impl Default for MetFilterFlags {
    fn default() -> Self {
        Self {
            halo: true,
            hbhe: true,
            hbhe_iso: true,
            ecal_dead_cell: true,
            bad_sc: true,
            good_vertices: true,
        }
    }
}

/// One reconstructed collision event as read from the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Run number.
    pub run: u32,
    /// Luminosity section.
    pub lumi: u32,
    /// Event number.
    pub event: u64,
    /// Generator weight (1 for data).
    pub weight: f64,
    /// Number of reconstructed primary vertices.
    pub npv: u32,
    /// True number of pileup interactions (simulation).
    pub true_pileup: f64,
    /// Names of the trigger paths that fired.
    pub triggers: Vec<String>,
    /// MET filter results.
    pub met_filters: MetFilterFlags,
    /// Photons, ordered by decreasing pT.
    pub photons: Vec<Photon>,
    /// Electrons, ordered by decreasing pT.
    pub electrons: Vec<Lepton>,
    /// Muons, ordered by decreasing pT.
    pub muons: Vec<Lepton>,
    /// Hadronic taus.
    pub taus: Vec<Particle>,
    /// Jets, ordered by decreasing pT.
    pub jets: Vec<Jet>,
    /// Missing transverse momentum.
    pub met: Met,
    /// Generator particles (simulation).
    pub gen_particles: Vec<GenParticle>,
    /// Relative PDF replica weights (simulation).
    pub pdf_weights: Vec<f64>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            run: 1,
            lumi: 1,
            event: 0,
            weight: 1.0,
            npv: 0,
            true_pileup: 0.0,
            triggers: Vec::new(),
            met_filters: MetFilterFlags::default(),
            photons: Vec::new(),
            electrons: Vec::new(),
            muons: Vec::new(),
            taus: Vec::new(),
            jets: Vec::new(),
            met: Met::default(),
            gen_particles: Vec::new(),
            pdf_weights: Vec::new(),
        }
    }
}

/// Object collections operators can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Selected photons.
    Photons,
    /// Selected electrons.
    Electrons,
    /// Selected muons.
    Muons,
    /// Hadronic taus.
    Taus,
    /// Cleaned jets.
    Jets,
}

/// Minimal kinematic view of an object in an output collection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Candidate {
    /// Transverse momentum.
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Electric charge (0 for neutral objects).
    pub charge: i32,
}

impl_kinematic!(Candidate);

/// The skim output event: what operators selected and computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkimEvent {
    /// Selected photons (the candidate first).
    pub photons: Vec<Photon>,
    /// Selected electrons.
    pub electrons: Vec<Lepton>,
    /// Selected muons.
    pub muons: Vec<Lepton>,
    /// Jets surviving overlap cleaning.
    pub jets: Vec<Jet>,
    /// MET as copied and corrected by the pipeline.
    pub met: MetVector,
    /// Named per-event quantities (branch name → value).
    pub observables: BTreeMap<String, f64>,
}

impl SkimEvent {
    /// Kinematic view of an output collection, in order.
    ///
    /// Taus are not stored in the output and come back empty.
    pub fn candidates(&self, collection: Collection) -> Vec<Candidate> {
        fn view<T: Kinematic>(objs: &[T], charge: impl Fn(&T) -> i32) -> Vec<Candidate> {
            objs.iter()
                .map(|o| Candidate { pt: o.pt(), eta: o.eta(), phi: o.phi(), charge: charge(o) })
                .collect()
        }
        match collection {
            Collection::Photons => view(&self.photons, |_| 0),
            Collection::Electrons => view(&self.electrons, |l| l.charge),
            Collection::Muons => view(&self.muons, |l| l.charge),
            Collection::Jets => view(&self.jets, |_| 0),
            Collection::Taus => Vec::new(),
        }
    }
}

/// Azimuthal separation folded into [0, pi].
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut d = (phi1 - phi2).abs() % (2.0 * PI);
    if d > PI {
        d = 2.0 * PI - d;
    }
    d
}

/// Angular separation in (eta, phi).
pub fn delta_r(a: &impl Kinematic, b: &impl Kinematic) -> f64 {
    let deta = a.eta() - b.eta();
    deta.hypot(delta_phi(a.phi(), b.phi()))
}

/// Transverse mass of an object and a MET vector.
pub fn transverse_mass(obj: &impl Kinematic, met: &MetVector) -> f64 {
    (2.0 * obj.pt() * met.pt * (1.0 - (obj.phi() - met.phi).cos())).max(0.0).sqrt()
}

/// Invariant mass of two massless objects.
pub fn invariant_mass(a: &impl Kinematic, b: &impl Kinematic) -> f64 {
    let m2 = 2.0 * a.pt() * b.pt() * ((a.eta() - b.eta()).cosh() - (a.phi() - b.phi()).cos());
    m2.max(0.0).sqrt()
}
