//! Name → assembler and name → decorator registry used by the skim configuration.

use std::collections::BTreeMap;

use mx_core::{Error, Result};
use mx_pipeline::Pipeline;

use crate::assembler::{Assembler, AssemblyContext, Decorator, PipelineSeed, assembler, decorate};
use crate::{base, decorators, derived};

/// Registry of every region assembler and decorator reachable from a skim
/// configuration.
#[derive(Clone)]
pub struct RegionCatalog {
    assemblers: BTreeMap<String, Assembler>,
    decorators: BTreeMap<String, Decorator>,
}

macro_rules! register {
    ($catalog:expr, $module:ident :: { $($f:ident),* $(,)? }) => {
        $( $catalog.register_assembler(stringify!($f), assembler($module::$f)); )*
    };
}

impl RegionCatalog {
    /// Empty catalogue.
    pub fn new() -> Self {
        Self { assemblers: BTreeMap::new(), decorators: BTreeMap::new() }
    }

    /// Every base and derived assembler plus the standard decorators.
    pub fn standard() -> Self {
        let mut c = Self::new();

        register!(c, base::{
            monophoton_base,
            purity_base,
            lepton_base,
            electron_base,
            muon_base,
            tag_and_probe_base,
            tagprobe_base,
        });
        register!(c, derived::{
            monoph, signal_raw, efake, hfake, hfake_tight, hfake_loose, gjets,
            halo, halo_mip, halo_met, halo_loose, halo_mip_loose, halo_met_loose,
            halo_medium, halo_mip_medium, halo_met_medium, halo_no_shower_cut,
            trivial_shower, wenu,
            purity, purity_nom, purity_tight, purity_loose,
            diel, diel_all_photon, diel_hfake, monoel, monoel_hfake,
            dimu, dimu_all_photon, dimu_hfake, monomu, monomu_all_photon, monomu_hfake,
            elmu, monoel_vertex, monomu_vertex, diel_vertex, dimu_vertex,
            zee_base, zee_jets, zmm_base, zmm_jets, zmumu,
            tpeg, tpmg, tpeg_low_pt, tpmg_low_pt, tpmmg,
        });

        c.register_decorator("kfactor", decorators::kfactor);
        c.register_decorator("genveto", decorators::genveto);
        c.register_decorator("wlnu", decorators::wlnu);
        c.register_decorator("wglo", decorators::wglo);
        c.register_decorator("dph", decorators::dph);
        c.register_decorator("had_proxy", decorators::had_proxy);
        c
    }

    /// Add or replace an assembler.
    pub fn register_assembler(&mut self, name: impl Into<String>, f: Assembler) {
        self.assemblers.insert(name.into(), f);
    }

    /// Add or replace a decorator.
    pub fn register_decorator(&mut self, name: impl Into<String>, d: Decorator) {
        self.decorators.insert(name.into(), d);
    }

    /// Assembler registered as `name`.
    pub fn assembler(&self, name: &str) -> Result<Assembler> {
        self.assemblers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unknown assembler '{name}'")))
    }

    /// Decorator registered as `name`.
    pub fn decorator(&self, name: &str) -> Result<Decorator> {
        self.decorators
            .get(name)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("unknown decorator '{name}'")))
    }

    /// Assembler names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assemblers.keys().map(String::as_str)
    }

    /// Decorator names, sorted.
    pub fn decorator_names(&self) -> impl Iterator<Item = &str> {
        self.decorators.keys().map(String::as_str)
    }

    /// Resolve `assembler` and wrap it in `decorators` (first listed innermost).
    pub fn compose(&self, assembler: &str, decorators: &[String]) -> Result<Assembler> {
        let inner = self.assembler(assembler)?;
        let wraps = decorators.iter().map(|d| self.decorator(d)).collect::<Result<Vec<_>>>()?;
        Ok(decorate(inner, &wraps))
    }

    /// Assemble region `region` for the context's sample.
    pub fn build(
        &self,
        ctx: &AssemblyContext,
        region: &str,
        assembler: &str,
        decorators: &[String],
    ) -> Result<Pipeline> {
        let f = self.compose(assembler, decorators)?;
        f(ctx, PipelineSeed::from(region))
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for RegionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionCatalog")
            .field("assemblers", &self.assemblers.keys().collect::<Vec<_>>())
            .field("decorators", &self.decorators.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalogue_is_complete() {
        let c = RegionCatalog::standard();
        for name in ["monophoton_base", "monoph", "hfake", "halo_met_loose", "tpmmg", "zmumu"] {
            assert!(c.assembler(name).is_ok(), "{name}");
        }
        let decorators: Vec<_> = c.decorator_names().collect();
        assert_eq!(decorators, vec!["dph", "genveto", "had_proxy", "kfactor", "wglo", "wlnu"]);
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let c = RegionCatalog::standard();
        assert!(matches!(c.assembler("monojet"), Err(Error::Configuration(_))));
        let err = c.compose("monoph", &["smear".to_string()]).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
