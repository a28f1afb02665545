//! Base assemblers: the fixed operator sequences every region starts from.
//!
//! Each base appends its named stages to the seed, adds the trigger for real
//! data and the normalization weights for simulation, wires the MET
//! variations into the angle cuts and marks the decisions that the derived
//! regions only record.

use mx_core::Result;
use mx_pipeline::operators::{
    BjetVeto, CopyMet, CopySuperClusters, ElectronVeto, HighMet, HighPtJetSelection, HltFilter,
    IdSfWeight, JetCleaning, JetMetDPhi, LeptonFlavor, LeptonRecoil, LeptonSelection, MetFilters,
    MetSource, MetVariations, MuonVeto, PhotonJetDPhi, PhotonMetDPhi, PhotonMt, PhotonSelection,
    SfVariable, TagAndProbePairZ, TauVeto,
};
use mx_pipeline::{Collection, Pipeline};

use crate::assembler::{AssemblyContext, PipelineSeed, tables};

/// Select the configured working point and, when `full` is set, the full
/// candidate selection with an empty veto.
fn configure_photons(ctx: &AssemblyContext, p: &mut Pipeline, full: bool) -> Result<()> {
    let sel = p.find_as::<PhotonSelection>("PhotonSelection")?;
    sel.set_wp(ctx.config.photon_wp);
    if full {
        sel.reset_selection();
        sel.reset_veto();
        for &c in &ctx.config.photon_full_selection {
            sel.add_selection(true, c);
        }
    }
    Ok(())
}

fn add_photon_trigger(ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    if ctx.sample.is_data {
        p.add_operator(HltFilter::new(&ctx.config.photon_trigger))?;
    }
    Ok(())
}

/// Monophoton candidate-like selection: high-pT photon, lepton vetoes,
/// photon-MET and jet-MET angles, MET threshold.
pub fn monophoton_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = seed.into_pipeline();
    let mc = !ctx.sample.is_data;

    add_photon_trigger(ctx, &mut p)?;
    p.add_operator(MetFilters::new())?;
    p.add_operator(PhotonSelection::new())?;
    p.add_operator(MuonVeto::new())?;
    p.add_operator(ElectronVeto::new())?;
    p.add_operator(TauVeto::new())?;
    p.add_operator(BjetVeto::new())?;
    p.add_operator(JetCleaning::new())?;
    p.add_operator(CopyMet::new())?;
    p.add_operator(CopySuperClusters::new())?;
    if mc {
        p.add_operator(MetVariations::new())?;
    }
    p.add_operator(PhotonMetDPhi::new())?;
    p.add_operator(JetMetDPhi::new())?;
    p.add_operator(PhotonJetDPhi::new())?;
    p.add_operator(HighMet::new())?;
    p.add_operator(PhotonMt::new())?;

    configure_photons(ctx, &mut p, false)?;

    if mc {
        let photons = p.handle("PhotonSelection")?;
        p.find_as::<MetVariations>("MetVariations")?.set_photon_selection(photons);
        let variations = p.handle("MetVariations")?;
        p.find_as::<PhotonMetDPhi>("PhotonMetDPhi")?.set_met_variations(variations.clone());
        p.find_as::<JetMetDPhi>("JetMetDPhi")?.set_met_variations(variations.clone());
        p.find_as::<PhotonJetDPhi>("PhotonJetDPhi")?.set_met_variations(variations);

        ctx.add_mc_weights(&mut p)?;
    }

    p.ignore_decisions(&["TauVeto", "BjetVeto", "PhotonMetDPhi", "JetMetDPhi", "HighMet"])?;
    p.find_as::<JetCleaning>("JetCleaning")?.set_clean_against(Collection::Taus, false);

    Ok(p)
}

/// EM+jet control region base: looser photon pT, one hard jet.
pub fn purity_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = seed.into_pipeline();

    add_photon_trigger(ctx, &mut p)?;
    p.add_operator(MetFilters::new())?;
    p.add_operator(PhotonSelection::new())?;
    p.add_operator(MuonVeto::new())?;
    p.add_operator(ElectronVeto::new())?;
    p.add_operator(TauVeto::new())?;
    p.add_operator(BjetVeto::new())?;
    p.add_operator(JetCleaning::new())?;
    p.add_operator(HighPtJetSelection::new())?;
    p.add_operator(CopyMet::new())?;
    p.add_operator(CopySuperClusters::new())?;
    p.add_operator(JetMetDPhi::new())?;
    p.add_operator(PhotonMetDPhi::new())?;

    configure_photons(ctx, &mut p, false)?;

    if !ctx.sample.is_data {
        ctx.add_mc_weights(&mut p)?;
    }

    p.find_as::<PhotonSelection>("PhotonSelection")?.set_min_pt(100.0);
    p.ignore_decisions(&["TauVeto", "BjetVeto", "JetMetDPhi", "PhotonMetDPhi"])?;
    p.find_as::<JetCleaning>("JetCleaning")?.set_clean_against(Collection::Taus, false);
    p.find_as::<HighPtJetSelection>("HighPtJetSelection")?.set_jet_pt_cut(100.0);

    Ok(p)
}

/// Photon plus n leptons. The leptons are added to the MET (recoil); the
/// jet-MET angle uses the uncorrected MET.
pub fn lepton_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = seed.into_pipeline();
    let mc = !ctx.sample.is_data;

    add_photon_trigger(ctx, &mut p)?;
    p.add_operator(MetFilters::new())?;
    p.add_operator(PhotonSelection::new())?;
    p.add_operator(LeptonSelection::new())?;
    p.add_operator(TauVeto::new())?;
    p.add_operator(BjetVeto::new())?;
    p.add_operator(JetCleaning::new())?;
    p.add_operator(CopyMet::new())?;
    p.add_operator(CopySuperClusters::new())?;
    p.add_operator(LeptonRecoil::new())?;
    if mc {
        p.add_operator(MetVariations::new())?;
        let mut real = MetVariations::named("RealMetVar");
        real.set_met_source(MetSource::Input);
        p.add_operator(real)?;
    }
    p.add_operator(PhotonMetDPhi::new())?;
    p.add_operator(JetMetDPhi::new())?;
    p.add_operator(HighMet::new())?;

    p.find_as::<JetMetDPhi>("JetMetDPhi")?.set_met_source(MetSource::Input);
    configure_photons(ctx, &mut p, true)?;

    if mc {
        let photons = p.handle("PhotonSelection")?;
        p.find_as::<MetVariations>("MetVariations")?.set_photon_selection(photons.clone());
        p.find_as::<MetVariations>("RealMetVar")?.set_photon_selection(photons);

        let variations = p.handle("MetVariations")?;
        p.find_as::<PhotonMetDPhi>("PhotonMetDPhi")?.set_met_variations(variations);
        let real = p.handle("RealMetVar")?;
        p.find_as::<JetMetDPhi>("JetMetDPhi")?.set_met_variations(real);

        ctx.add_mc_weights(&mut p)?;

        let mut idsf = IdSfWeight::new(Collection::Photons, "photonSF");
        idsf.add_factor(ctx.lookup(tables::PHOTON_SF)?);
        idsf.set_variable(SfVariable::Eta, Some(SfVariable::Pt));
        p.add_operator(idsf)?;
        ctx.add_pdf_variation(&mut p)?;
    }

    p.ignore_decisions(&["TauVeto", "BjetVeto", "PhotonMetDPhi", "JetMetDPhi", "HighMet"])?;
    p.find_as::<JetCleaning>("JetCleaning")?.set_clean_against(Collection::Taus, false);

    Ok(p)
}

/// [`lepton_base`] with the recoil built from electrons.
pub fn electron_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = lepton_base(ctx, seed)?;
    p.find_as::<LeptonRecoil>("LeptonRecoil")?.set_flavor(LeptonFlavor::Electron);
    Ok(p)
}

/// [`lepton_base`] with the recoil built from muons.
pub fn muon_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = lepton_base(ctx, seed)?;
    p.find_as::<LeptonRecoil>("LeptonRecoil")?.set_flavor(LeptonFlavor::Muon);
    Ok(p)
}

/// Z→ℓℓ tag-and-probe base. The lepton vetoes only record their decision;
/// the flavour and trigger are set by the derived regions.
pub fn tag_and_probe_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = seed.into_pipeline();

    p.add_operator(MetFilters::new())?;
    p.add_operator(MuonVeto::new())?;
    p.add_operator(ElectronVeto::new())?;
    p.add_operator(TauVeto::new())?;
    p.add_operator(BjetVeto::new())?;
    p.add_operator(TagAndProbePairZ::new())?;
    p.add_operator(JetCleaning::new())?;
    p.add_operator(CopyMet::new())?;
    p.add_operator(CopySuperClusters::new())?;
    p.add_operator(JetMetDPhi::new())?;
    p.add_operator(HighMet::new())?;

    if !ctx.sample.is_data {
        ctx.add_mc_weights(&mut p)?;
    }

    p.ignore_decisions(&["MuonVeto", "ElectronVeto", "TauVeto", "BjetVeto", "HighMet"])?;
    p.find_as::<JetCleaning>("JetCleaning")?.set_clean_against(Collection::Taus, false);
    p.find_as::<HighMet>("HighMet")?.set_threshold(50.0);

    Ok(p)
}

/// Base for the photon tag-and-probe skims. The trigger follows the primary
/// dataset (`sph*`, `sel*`, `smu*`); simulation only gets the pileup weight.
pub fn tagprobe_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = seed.into_pipeline();
    let cfg = &ctx.config;

    let trigger = match ctx.sample.name.get(..3) {
        Some("sph") => Some(&cfg.photon_trigger),
        Some("sel") => Some(&cfg.electron_trigger),
        Some("smu") => Some(&cfg.muon_trigger),
        _ => None,
    };
    if let Some(paths) = trigger {
        p.add_operator(HltFilter::new(paths))?;
    }

    if !ctx.sample.is_data {
        ctx.add_pileup_weight(&mut p)?;
    }

    Ok(p)
}
