//! Built-in operators.
//!
//! The physics content of each stage is a compact, deterministic rendition
//! of the corresponding analysis cut; what matters to the pipeline is the
//! contract (name, decision/weight flags, dependencies, variations).

pub mod filters;
pub mod jets;
pub mod kinematics;
pub mod leptons;
pub mod met;
pub mod photon;
pub mod tagprobe;
pub mod truth;
pub mod weights;

pub use filters::{ExprCut, FilterMode, HltFilter, MetFilter, MetFilters};
pub use jets::{BjetVeto, HighPtJetSelection, JetCleaning};
pub use kinematics::{Mass, OppositeSign};
pub use leptons::{
    ElectronVeto, LeptonFlavor, LeptonMt, LeptonRecoil, LeptonSelection, LeptonVertex, MuonVeto,
    TauVeto,
};
pub use met::{
    CopyMet, HighMet, JetMetDPhi, MetSource, MetVariations, PhotonJetDPhi, PhotonMetDPhi, PhotonMt,
    PhotonRecoil,
};
pub use photon::{
    CopySuperClusters, CriterionMask, CriterionSet, PhotonCriterion, PhotonSelection, PhotonWp,
};
pub use tagprobe::{TagAndProbePairZ, TagProbeMode, TagProbePhoton, ZJetBackToBack};
pub use truth::{
    GenParticleSelection, GenPhotonDr, GenPhotonVeto, LeptonicDecayFilter, PhotonPtTruncator,
};
pub use weights::{
    ConstantWeight, IdSfWeight, NnpdfVariation, PhotonPtWeight, PhotonType, PuWeight, SfVariable,
};

#[cfg(test)]
pub(crate) mod testing {
    use crate::event::{Lepton, Photon};

    /// A barrel photon passing every medium-WP criterion.
    pub(crate) fn good_photon(pt: f64) -> Photon {
        Photon {
            pt,
            eta: 0.3,
            phi: 1.0,
            h_over_e: 0.01,
            sieie: 0.009,
            sipip: 0.009,
            ch_iso: 0.1,
            ch_iso_max: 0.1,
            nh_iso: 0.1,
            ph_iso: 0.1,
            pixel_veto: true,
            csafe_veto: true,
            mip_energy: 0.5,
            time: 0.2,
        }
    }

    /// A tight, trigger-matched lepton.
    pub(crate) fn tight_lepton(pt: f64, eta: f64, phi: f64, charge: i32) -> Lepton {
        Lepton {
            pt,
            eta,
            phi,
            charge,
            loose: true,
            medium: true,
            tight: true,
            trigger_match: true,
            dz: 0.01,
        }
    }
}
