//! Photon identification and candidate selection.

use std::fmt;

use mx_core::Evaluation;
use serde::{Deserialize, Serialize};

use crate::context::EventContext;
use crate::event::Photon;
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

/// Photon identification working point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotonWp {
    /// Loose ID.
    Loose,
    /// Medium ID.
    #[default]
    Medium,
    /// Tight ID.
    Tight,
}

impl PhotonWp {
    fn index(self) -> usize {
        match self {
            PhotonWp::Loose => 0,
            PhotonWp::Medium => 1,
            PhotonWp::Tight => 2,
        }
    }
}

// Barrel cut values per working point (loose, medium, tight).
const HOVERE: [f64; 3] = [0.0597, 0.0396, 0.0269];
const SIEIE: [f64; 3] = [0.01031, 0.01022, 0.00994];
const CHISO: [f64; 3] = [1.295, 0.441, 0.202];
const NHISO: [f64; 3] = [10.910, 2.725, 0.264];
const PHISO: [f64; 3] = [3.630, 2.571, 2.362];

/// One photon identification requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotonCriterion {
    /// Hadronic leakage.
    HOverE,
    /// Shower width at the working point.
    Sieie,
    /// Shower width < 0.012.
    Sieie12,
    /// Shower width < 0.015.
    Sieie15,
    /// Neutral-hadron isolation at the working point.
    NHIso,
    /// Neutral-hadron isolation, tight.
    NHIsoTight,
    /// Neutral-hadron isolation, loose.
    NHIsoLoose,
    /// Photon isolation at the working point.
    PhIso,
    /// Photon isolation, tight.
    PhIsoTight,
    /// Photon isolation, loose.
    PhIsoLoose,
    /// Charged-hadron isolation (selected vertex).
    CHIso,
    /// Charged-hadron isolation (worst vertex).
    CHIsoMax,
    /// Worst-vertex charged-hadron isolation < 11 GeV.
    CHIsoMax11,
    /// Pixel-seed veto.
    EVeto,
    /// Conversion-safe electron veto.
    CSafeVeto,
    /// Muon-system energy < 4.9 GeV (beam-halo rejection).
    MIP49,
    /// In-time seed crystal.
    Time,
    /// Non-degenerate sieie.
    SieieNonzero,
    /// Non-degenerate sipip.
    SipipNonzero,
    /// Outside the known noisy ECAL region.
    NoisyRegion,
}

impl PhotonCriterion {
    /// Parse a criterion name (`"CHIsoMax11"`).
    pub fn from_name(name: &str) -> Option<Self> {
        use PhotonCriterion::*;
        Some(match name {
            "HOverE" => HOverE,
            "Sieie" => Sieie,
            "Sieie12" => Sieie12,
            "Sieie15" => Sieie15,
            "NHIso" => NHIso,
            "NHIsoTight" => NHIsoTight,
            "NHIsoLoose" => NHIsoLoose,
            "PhIso" => PhIso,
            "PhIsoTight" => PhIsoTight,
            "PhIsoLoose" => PhIsoLoose,
            "CHIso" => CHIso,
            "CHIsoMax" => CHIsoMax,
            "CHIsoMax11" => CHIsoMax11,
            "EVeto" => EVeto,
            "CSafeVeto" => CSafeVeto,
            "MIP49" => MIP49,
            "Time" => Time,
            "SieieNonzero" => SieieNonzero,
            "SipipNonzero" => SipipNonzero,
            "NoisyRegion" => NoisyRegion,
            _ => return None,
        })
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Whether `photon` satisfies this requirement at working point `wp`.
    pub fn passes(self, photon: &Photon, wp: PhotonWp) -> bool {
        use PhotonCriterion::*;
        let w = wp.index();
        let pt = photon.pt;
        let nh_cut = |i: usize| NHISO[i] + 0.0148 * pt + 0.000017 * pt * pt;
        let ph_cut = |i: usize| PHISO[i] + 0.0047 * pt;
        match self {
            HOverE => photon.h_over_e < HOVERE[w],
            Sieie => photon.sieie < SIEIE[w],
            Sieie12 => photon.sieie < 0.012,
            Sieie15 => photon.sieie < 0.015,
            NHIso => photon.nh_iso < nh_cut(w),
            NHIsoTight => photon.nh_iso < nh_cut(2),
            NHIsoLoose => photon.nh_iso < nh_cut(0),
            PhIso => photon.ph_iso < ph_cut(w),
            PhIsoTight => photon.ph_iso < ph_cut(2),
            PhIsoLoose => photon.ph_iso < ph_cut(0),
            CHIso => photon.ch_iso < CHISO[w],
            CHIsoMax => photon.ch_iso_max < CHISO[w],
            CHIsoMax11 => photon.ch_iso_max < 11.0,
            EVeto => photon.pixel_veto,
            CSafeVeto => photon.csafe_veto,
            MIP49 => photon.mip_energy < 4.9,
            Time => photon.time.abs() < 3.0,
            SieieNonzero => photon.sieie > 0.001,
            SipipNonzero => photon.sipip > 0.001,
            NoisyRegion => {
                !(photon.eta > 0.0 && photon.eta < 0.15 && photon.phi > 0.527 && photon.phi < 0.541)
            }
        }
    }
}

impl fmt::Display for PhotonCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A set of photon criteria tested together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct CriterionMask(u32);

impl CriterionMask {
    /// Mask of the listed criteria.
    pub fn of(criteria: &[PhotonCriterion]) -> Self {
        Self(criteria.iter().fold(0, |m, c| m | c.bit()))
    }

    /// Whether the mask contains `c`.
    pub fn contains(self, c: PhotonCriterion) -> bool {
        self.0 & c.bit() != 0
    }
}

impl From<PhotonCriterion> for CriterionMask {
    fn from(c: PhotonCriterion) -> Self {
        Self(c.bit())
    }
}

/// Ordered list of `(expected, mask)` entries.
///
/// A photon satisfies an entry when "passes every criterion in the mask"
/// equals `expected`, and satisfies the set when it satisfies every entry.
/// `(false, {Sieie12, CHIsoMax})` therefore reads "fails sieie or fails
/// CHIso".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriterionSet {
    entries: Vec<(bool, CriterionMask)>,
}

impl CriterionSet {
    /// Append an entry.
    pub fn push(&mut self, expected: bool, mask: impl Into<CriterionMask>) {
        self.entries.push((expected, mask.into()));
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[(bool, CriterionMask)] {
        &self.entries
    }

    /// Whether `photon` satisfies every entry (vacuously true when empty).
    pub fn matches(&self, photon: &Photon, wp: PhotonWp) -> bool {
        self.entries.iter().all(|&(expected, mask)| {
            let all =
                ALL_CRITERIA.iter().filter(|c| mask.contains(**c)).all(|c| c.passes(photon, wp));
            all == expected
        })
    }
}

const ALL_CRITERIA: [PhotonCriterion; 20] = {
    use PhotonCriterion::*;
    [
        HOverE, Sieie, Sieie12, Sieie15, NHIso, NHIsoTight, NHIsoLoose, PhIso, PhIsoTight,
        PhIsoLoose, CHIso, CHIsoMax, CHIsoMax11, EVeto, CSafeVeto, MIP49, Time, SieieNonzero,
        SipipNonzero, NoisyRegion,
    ]
};

/// Selects the photon candidate(s) of the event.
///
/// Photons inside the kinematic acceptance are visited in pT order. A
/// photon matching the (non-empty) veto set rejects the event; otherwise a
/// photon matching the selection set is copied to the output. The event
/// passes when at least one photon was selected.
pub struct PhotonSelection {
    core: OperatorCore,
    wp: PhotonWp,
    min_pt: f64,
    max_eta: f64,
    selection: CriterionSet,
    veto: CriterionSet,
}

impl PhotonSelection {
    /// Default selection: pT > 175, barrel, medium WP, no criteria.
    pub fn new() -> Self {
        Self::named("PhotonSelection")
    }

    /// Same as [`new`](Self::new) with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            core: OperatorCore::new(name),
            wp: PhotonWp::Medium,
            min_pt: 175.0,
            max_eta: 1.4442,
            selection: CriterionSet::default(),
            veto: CriterionSet::default(),
        }
    }

    /// Set the working point used by WP-dependent criteria.
    pub fn set_wp(&mut self, wp: PhotonWp) {
        self.wp = wp;
    }

    /// Working point.
    pub fn wp(&self) -> PhotonWp {
        self.wp
    }

    /// Minimum photon pT.
    pub fn set_min_pt(&mut self, pt: f64) {
        self.min_pt = pt;
    }

    /// Current minimum pT.
    pub fn min_pt(&self) -> f64 {
        self.min_pt
    }

    /// Clear the selection set.
    pub fn reset_selection(&mut self) {
        self.selection.clear();
    }

    /// Clear the veto set.
    pub fn reset_veto(&mut self) {
        self.veto.clear();
    }

    /// Add a selection entry.
    pub fn add_selection(&mut self, expected: bool, mask: impl Into<CriterionMask>) {
        self.selection.push(expected, mask);
    }

    /// Add a veto entry.
    pub fn add_veto(&mut self, expected: bool, mask: impl Into<CriterionMask>) {
        self.veto.push(expected, mask);
    }

    /// The selection set.
    pub fn selection(&self) -> &CriterionSet {
        &self.selection
    }

    /// The veto set.
    pub fn veto(&self) -> &CriterionSet {
        &self.veto
    }
}

impl Default for PhotonSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PhotonSelection {
    operator_common!("PhotonSelection");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let mut selected = Vec::new();
        for photon in &ctx.input.photons {
            if photon.pt < self.min_pt || photon.eta.abs() > self.max_eta {
                continue;
            }
            if !self.veto.is_empty() && self.veto.matches(photon, self.wp) {
                ctx.output.photons.clear();
                return Evaluation::decision(false);
            }
            if self.selection.matches(photon, self.wp) {
                selected.push(photon.clone());
            }
        }
        let pass = !selected.is_empty();
        ctx.output.photons = selected;
        Evaluation::decision(pass)
    }
}

/// Records the number of ECAL superclusters (photon objects) of the input.
pub struct CopySuperClusters {
    core: OperatorCore,
}

impl CopySuperClusters {
    /// New stage.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("CopySuperClusters") }
    }
}

impl Default for CopySuperClusters {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for CopySuperClusters {
    operator_common!("CopySuperClusters");

    fn produces_decision(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let n = ctx.input.photons.len() as f64;
        ctx.set_observable("nSuperClusters", n);
        Evaluation::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::operators::testing::good_photon;
    use PhotonCriterion::*;

    fn full(sel: &mut PhotonSelection) {
        let criteria = [
            HOverE, Sieie, NHIso, PhIso, CHIsoMax, EVeto, MIP49, Time, SieieNonzero, SipipNonzero,
            NoisyRegion,
        ];
        for c in criteria {
            sel.add_selection(true, c);
        }
    }

    fn run(sel: &PhotonSelection, photons: Vec<Photon>) -> (bool, usize) {
        let ev = Event { photons, ..Event::default() };
        let mut ctx = EventContext::new(&ev);
        let d = sel.evaluate(&mut ctx).decision.unwrap();
        (d, ctx.output.photons.len())
    }

    #[test]
    fn names_parse() {
        assert_eq!(PhotonCriterion::from_name("CHIsoMax11"), Some(CHIsoMax11));
        assert_eq!(PhotonCriterion::from_name("E2E995"), None);
        assert_eq!(MIP49.to_string(), "MIP49");
    }

    #[test]
    fn full_selection_keeps_good_photon() {
        let mut sel = PhotonSelection::new();
        full(&mut sel);
        assert_eq!(run(&sel, vec![good_photon(200.0)]), (true, 1));
        // below threshold / outside barrel
        assert_eq!(run(&sel, vec![good_photon(150.0)]), (false, 0));
        let mut fwd = good_photon(200.0);
        fwd.eta = 1.6;
        assert_eq!(run(&sel, vec![fwd]), (false, 0));

        sel.set_min_pt(100.0);
        assert_eq!(run(&sel, vec![good_photon(150.0)]), (true, 1));
    }

    #[test]
    fn inverted_mask_is_or_of_failures() {
        let mut set = CriterionSet::default();
        set.push(false, CriterionMask::of(&[Sieie12, CHIsoMax]));

        let good = good_photon(200.0);
        assert!(!set.matches(&good, PhotonWp::Medium));

        let mut wide = good.clone();
        wide.sieie = 0.013;
        assert!(set.matches(&wide, PhotonWp::Medium));

        let mut nonisolated = good.clone();
        nonisolated.ch_iso_max = 5.0;
        assert!(set.matches(&nonisolated, PhotonWp::Medium));
    }

    #[test]
    fn veto_rejects_event() {
        // hadron-fake style: select failures, veto genuine candidates
        let mut sel = PhotonSelection::new();
        sel.add_selection(false, CriterionMask::of(&[Sieie12, CHIsoMax]));
        sel.add_veto(true, Sieie12);
        sel.add_veto(true, CHIsoMax);

        let mut fake = good_photon(300.0);
        fake.sieie = 0.0125;
        assert_eq!(run(&sel, vec![fake.clone()]), (true, 1));
        assert_eq!(run(&sel, vec![good_photon(400.0), fake.clone()]), (false, 0));
        assert_eq!(run(&sel, vec![fake, good_photon(180.0)]), (false, 0));
    }

    #[test]
    fn working_point_matters() {
        let mut p = good_photon(200.0);
        p.h_over_e = 0.05;
        assert!(HOverE.passes(&p, PhotonWp::Loose));
        assert!(!HOverE.passes(&p, PhotonWp::Medium));

        // pT = 200: tight cut ~3.9, loose ~14.6
        p.nh_iso = 5.0;
        assert!(NHIsoLoose.passes(&p, PhotonWp::Tight));
        assert!(!NHIsoTight.passes(&p, PhotonWp::Loose));
    }

    #[test]
    fn noisy_region() {
        let mut p = good_photon(200.0);
        p.eta = 0.1;
        p.phi = 0.53;
        assert!(!NoisyRegion.passes(&p, PhotonWp::Medium));
        p.phi = 0.6;
        assert!(NoisyRegion.passes(&p, PhotonWp::Medium));
    }

    #[test]
    fn empty_selection_accepts_any_photon_in_acceptance() {
        let sel = PhotonSelection::new();
        let mut junk = good_photon(200.0);
        junk.h_over_e = 1.0;
        assert_eq!(run(&sel, vec![junk]), (true, 1));
        assert_eq!(run(&sel, vec![]), (false, 0));
    }
}
