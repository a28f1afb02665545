//! Decorators: wrap any assembler and uniformly add stages to its pipeline.
//!
//! Decorators compose by nesting. `decorate(f, &[d1, d2])` builds
//! `d2(d1(f))`, so the stages `d1` appends come before those of `d2`.

use std::sync::Arc;

use mx_core::{Result, VariationLookup};
use mx_pipeline::Pipeline;
use mx_pipeline::operators::{
    GenPhotonVeto, LeptonicDecayFilter, PhotonPtTruncator, PhotonPtWeight, PhotonRecoil,
    PhotonType,
};
use mx_tables::CorrectionTable;

use crate::assembler::{Assembler, AssemblyContext, PipelineSeed, assembler, tables};

/// Samples for which the QCD k-factor is not applied (NLO already).
pub const KFACTOR_EXEMPT: &[&str] =
    &["znng", "znng-130", "zllg", "zllg-130", "wnlg", "wnlg-130", "wnlg-500"];

const QCD_VARIATIONS: &[&str] = &["renUp", "renDown", "facUp", "facDown", "scaleUp", "scaleDown"];
const EWK_VARIATIONS: &[&str] = &["Up", "Down"];

/// Name under which the correction tables of a sample are filed: generator
/// slices and the charged-lepton twins share the tables of their reference
/// process.
pub fn normalized_sample_name(name: &str) -> String {
    name.replace("gj04", "gj").replace("zllg", "znng").replace("wglo", "wnlg").replace("-o", "")
}

/// Run `inner`, then hand its pipeline to `post`.
fn after(inner: Assembler, post: fn(&AssemblyContext, &mut Pipeline) -> Result<()>) -> Assembler {
    assembler(move |ctx, seed| {
        let mut p = inner(ctx, seed)?;
        post(ctx, &mut p)?;
        Ok(p)
    })
}

fn correction_weight(
    correction: Arc<CorrectionTable>,
    name: &str,
    photon_type: PhotonType,
    prefix: &str,
    variations: &[&str],
) -> PhotonPtWeight {
    let available = correction.variation_names();
    let mut weight = PhotonPtWeight::new(correction.clone(), name);
    weight.set_photon_type(photon_type);
    for &variation in variations.iter().filter(|v| available.iter().any(|a| a == *v)) {
        weight.add_table_variation(format!("{prefix}{variation}"), correction.clone(), variation);
    }
    weight
}

fn add_kfactor(ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    let sname = normalized_sample_name(&ctx.sample.name);

    if !KFACTOR_EXEMPT.contains(&ctx.sample.name.as_str()) {
        let qcd = ctx.tables.correction(tables::KFACTOR, &sname).ok_or_else(|| {
            mx_core::Error::Configuration(format!("no k-factor defined for '{sname}'"))
        })?;
        log::debug!(
            "applying qcd k-factor {sname} to {} ({} variations)",
            ctx.sample.name,
            qcd.variations.len()
        );
        p.add_operator(correction_weight(
            qcd,
            "QCDCorrection",
            PhotonType::PostShower,
            "qcd",
            QCD_VARIATIONS,
        ))?;
    }

    if let Some(ewk) = ctx.tables.correction(tables::EWK, &sname) {
        log::debug!("applying ewk correction {sname} to {}", ctx.sample.name);
        p.add_operator(correction_weight(
            ewk,
            "EWKNLOCorrection",
            PhotonType::Parton,
            "ewk",
            EWK_VARIATIONS,
        ))?;
    }
    Ok(())
}

/// QCD k-factor (`qcd*` variations) and, where defined, the electroweak
/// NLO correction (`ewk*` variations).
pub fn kfactor(inner: Assembler) -> Assembler {
    after(inner, add_kfactor)
}

fn add_gen_photon_veto(_ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    let mut veto = GenPhotonVeto::new();
    veto.set_min_pt(130.0);
    veto.set_min_parton_dr(0.5);
    p.insert_operator(veto, 0)
}

/// Veto events with a prompt generator photon (overlap removal between
/// inclusive and photon-enriched samples).
pub fn genveto(inner: Assembler) -> Assembler {
    after(inner, add_gen_photon_veto)
}

fn add_pt_truncator(_ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    let mut truncator = PhotonPtTruncator::new();
    truncator.set_pt_max(500.0);
    p.insert_operator(truncator, 0)
}

/// Cut the LHE photon pT of the inclusive Wγ sample.
pub fn wglo(inner: Assembler) -> Assembler {
    after(inner, add_pt_truncator)
}

fn add_photon_recoil(_ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    p.add_operator(PhotonRecoil::new())
}

/// Turn a diphoton sample into photon + dark photon by moving one photon
/// into the MET.
pub fn dph(inner: Assembler) -> Assembler {
    after(inner, add_photon_recoil)
}

/// Let the inner assembler start from a pipeline that keeps only
/// non-electron W decays.
pub fn wlnu(inner: Assembler) -> Assembler {
    assembler(move |ctx, seed: PipelineSeed| {
        let mut p = seed.into_pipeline();
        p.insert_operator(LeptonicDecayFilter::named("WlnuFilter"), 0)?;
        inner(ctx, PipelineSeed::Pipeline(p))
    })
}

/// Append the hadronic-proxy transfer factor with its purity variations.
pub fn add_hadron_proxy_weight(ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    let mut weight = PhotonPtWeight::new(ctx.lookup(tables::HADRON_TFACTOR)?, "hadProxyWeight");
    weight.set_photon_type(PhotonType::Reco);
    weight.add_variation("purityUp", ctx.lookup(tables::HADRON_TFACTOR_PURITY_UP)?);
    weight.add_variation("purityDown", ctx.lookup(tables::HADRON_TFACTOR_PURITY_DOWN)?);
    p.add_operator(weight)
}

/// Weight the region as a hadronic-fake proxy.
pub fn had_proxy(inner: Assembler) -> Assembler {
    after(inner, add_hadron_proxy_weight)
}
