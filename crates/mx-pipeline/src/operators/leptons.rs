//! Lepton selection, vetoes and lepton-derived quantities.

use mx_core::Evaluation;
use serde::{Deserialize, Serialize};

use crate::context::EventContext;
use crate::event::{Lepton, delta_r, transverse_mass};
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

const SELECT_PT: f64 = 30.0;
const VETO_PT: f64 = 10.0;
const PHOTON_DR: f64 = 0.5;

/// Charged-lepton flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeptonFlavor {
    /// Electrons.
    #[default]
    Electron,
    /// Muons.
    Muon,
}

impl LeptonFlavor {
    fn max_eta(self) -> f64 {
        match self {
            LeptonFlavor::Electron => 2.5,
            LeptonFlavor::Muon => 2.4,
        }
    }

    fn input<'e>(self, ctx: &EventContext<'e>) -> &'e [Lepton] {
        match self {
            LeptonFlavor::Electron => &ctx.input.electrons,
            LeptonFlavor::Muon => &ctx.input.muons,
        }
    }

    fn output<'c>(self, ctx: &'c EventContext<'_>) -> &'c [Lepton] {
        match self {
            LeptonFlavor::Electron => &ctx.output.electrons,
            LeptonFlavor::Muon => &ctx.output.muons,
        }
    }
}

fn away_from_photons(lep: &Lepton, ctx: &EventContext<'_>) -> bool {
    ctx.output.photons.iter().all(|ph| delta_r(lep, ph) > PHOTON_DR)
}

/// Selects exactly `n_el` electrons and `n_mu` muons.
///
/// Selected leptons pass the identification requirement and pT > 30 GeV and
/// are copied to the output. With the strict flag of a flavor, additional
/// loose leptons of that flavor are not allowed either.
pub struct LeptonSelection {
    core: OperatorCore,
    n_el: usize,
    n_mu: usize,
    strict_el: bool,
    strict_mu: bool,
    require_tight: bool,
    require_medium: bool,
}

impl LeptonSelection {
    /// Tight leptons, strict on both flavors, zero of each required.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("LeptonSelection"),
            n_el: 0,
            n_mu: 0,
            strict_el: true,
            strict_mu: true,
            require_tight: true,
            require_medium: false,
        }
    }

    /// Required electron and muon counts.
    pub fn set_n(&mut self, n_el: usize, n_mu: usize) {
        self.n_el = n_el;
        self.n_mu = n_mu;
    }

    /// Required counts `(electrons, muons)`.
    pub fn n(&self) -> (usize, usize) {
        (self.n_el, self.n_mu)
    }

    /// Forbid extra loose electrons.
    pub fn set_strict_el(&mut self, strict: bool) {
        self.strict_el = strict;
    }

    /// Forbid extra loose muons.
    pub fn set_strict_mu(&mut self, strict: bool) {
        self.strict_mu = strict;
    }

    /// Require tight identification.
    pub fn set_require_tight(&mut self, tight: bool) {
        self.require_tight = tight;
    }

    /// Require medium identification.
    pub fn set_require_medium(&mut self, medium: bool) {
        self.require_medium = medium;
    }

    fn identified(&self, lep: &Lepton) -> bool {
        (!self.require_tight || lep.tight) && (!self.require_medium || lep.medium) && lep.loose
    }

    fn count(
        &self,
        ctx: &EventContext<'_>,
        flavor: LeptonFlavor,
        strict: bool,
        n: usize,
    ) -> (Vec<Lepton>, bool) {
        let accept = |l: &Lepton| l.eta.abs() < flavor.max_eta() && away_from_photons(l, ctx);
        let selected: Vec<Lepton> = flavor
            .input(ctx)
            .iter()
            .filter(|l| accept(*l) && l.pt > SELECT_PT && self.identified(l))
            .cloned()
            .collect();
        let loose =
            flavor.input(ctx).iter().filter(|l| accept(*l) && l.pt > VETO_PT && l.loose).count();
        let ok = selected.len() == n && (!strict || loose == n);
        (selected, ok)
    }
}

impl Default for LeptonSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for LeptonSelection {
    operator_common!("LeptonSelection");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let (electrons, el_ok) = self.count(ctx, LeptonFlavor::Electron, self.strict_el, self.n_el);
        let (muons, mu_ok) = self.count(ctx, LeptonFlavor::Muon, self.strict_mu, self.n_mu);
        ctx.output.electrons = electrons;
        ctx.output.muons = muons;
        Evaluation::decision(el_ok && mu_ok)
    }
}

macro_rules! lepton_veto {
    ($name:ident, $label:literal, $what:literal, $flavor:expr) => {
        #[doc = concat!("Rejects events with a loose ", $what, " away from the photon.")]
        pub struct $name {
            core: OperatorCore,
        }

        impl $name {
            /// New veto.
            pub fn new() -> Self {
                Self { core: OperatorCore::new(stringify!($name)) }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Operator for $name {
            operator_common!($label);

            fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
                let flavor = $flavor;
                let ctx: &EventContext<'_> = ctx;
                let found = flavor.input(ctx).iter().any(|l| {
                    l.loose
                        && l.pt > VETO_PT
                        && l.eta.abs() < flavor.max_eta()
                        && away_from_photons(l, ctx)
                });
                Evaluation::decision(!found)
            }
        }
    };
}

lepton_veto!(ElectronVeto, "ElectronVeto", "electron", LeptonFlavor::Electron);
lepton_veto!(MuonVeto, "MuonVeto", "muon", LeptonFlavor::Muon);

/// Rejects events with a hadronic tau candidate.
pub struct TauVeto {
    core: OperatorCore,
}

impl TauVeto {
    /// New veto.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("TauVeto") }
    }
}

impl Default for TauVeto {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for TauVeto {
    operator_common!("TauVeto");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let found = ctx.input.taus.iter().any(|t| t.pt > 18.0 && t.eta.abs() < 2.3);
        Evaluation::decision(!found)
    }
}

/// Adds the selected leptons of one flavor back into the output MET,
/// turning it into the hadronic recoil.
pub struct LeptonRecoil {
    core: OperatorCore,
    flavor: LeptonFlavor,
}

impl LeptonRecoil {
    /// Recoil against electrons until reconfigured.
    pub fn new() -> Self {
        Self { core: OperatorCore::new("LeptonRecoil"), flavor: LeptonFlavor::Electron }
    }

    /// Flavor whose leptons are added to the MET.
    pub fn set_flavor(&mut self, flavor: LeptonFlavor) {
        self.flavor = flavor;
    }

    /// Current flavor.
    pub fn flavor(&self) -> LeptonFlavor {
        self.flavor
    }
}

impl Default for LeptonRecoil {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for LeptonRecoil {
    operator_common!("LeptonRecoil");

    fn produces_decision(&self) -> bool {
        false
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let real = ctx.output.met;
        let recoil = self.flavor.output(ctx).iter().fold(real, |m, l| m.add_scaled(l, 1.0));
        ctx.output.met = recoil;
        ctx.set_observable("realMet", real.pt);
        ctx.set_observable("realPhi", real.phi);
        Evaluation::neutral()
    }
}

/// Transverse mass window of the leading lepton and the input MET.
pub struct LeptonMt {
    core: OperatorCore,
    flavor: LeptonFlavor,
    min: f64,
    max: f64,
}

impl LeptonMt {
    /// Window `[0, inf)` on electrons.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("LeptonMt"),
            flavor: LeptonFlavor::Electron,
            min: 0.0,
            max: f64::INFINITY,
        }
    }

    /// Lepton flavor.
    pub fn set_flavor(&mut self, flavor: LeptonFlavor) {
        self.flavor = flavor;
    }

    /// Lower bound.
    pub fn set_min(&mut self, min: f64) {
        self.min = min;
    }

    /// Upper bound.
    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }
}

impl Default for LeptonMt {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for LeptonMt {
    operator_common!("LeptonMt");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(lep) = self.flavor.output(ctx).first() else {
            return Evaluation::decision(false);
        };
        let mt = transverse_mass(lep, &ctx.input.met.vector());
        ctx.set_observable("mt", mt);
        Evaluation::decision(mt >= self.min && mt <= self.max)
    }
}

/// Requires the leading selected lepton to come from the primary vertex.
pub struct LeptonVertex {
    core: OperatorCore,
    species: LeptonFlavor,
    max_dz: f64,
}

impl LeptonVertex {
    /// Electron species, |dz| < 0.5 cm.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("LeptonVertex"),
            species: LeptonFlavor::Electron,
            max_dz: 0.5,
        }
    }

    /// Lepton species.
    pub fn set_species(&mut self, species: LeptonFlavor) {
        self.species = species;
    }
}

impl Default for LeptonVertex {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for LeptonVertex {
    operator_common!("LeptonVertex");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some(lep) = self.species.output(ctx).first() else {
            return Evaluation::decision(false);
        };
        let dz = lep.dz;
        ctx.set_observable("vertexDz", dz);
        Evaluation::decision(dz.abs() < self.max_dz)
    }
}
