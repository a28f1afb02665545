//! Derived assemblers: analysis regions built by reshaping a base pipeline.

use mx_core::Result;
use mx_pipeline::operators::{
    CriterionMask, FilterMode, GenParticleSelection, GenPhotonDr, HighMet, HighPtJetSelection,
    HltFilter, IdSfWeight, LeptonFlavor, LeptonMt, LeptonSelection, LeptonVertex,
    LeptonicDecayFilter, Mass, MetFilter, MetFilters, MetSource, OppositeSign, PhotonCriterion,
    PhotonPtWeight, PhotonSelection, PhotonType, SfVariable, TagAndProbePairZ, TagProbeMode,
    TagProbePhoton, ZJetBackToBack,
};
use mx_pipeline::{Collection, Operator, Pipeline};

use crate::assembler::{AssemblyContext, PipelineSeed, tables};
use crate::base::{
    electron_base, monophoton_base, muon_base, purity_base, tag_and_probe_base, tagprobe_base,
};
use crate::decorators::add_hadron_proxy_weight;

use PhotonCriterion::*;

fn photons(p: &mut Pipeline) -> Result<&mut PhotonSelection> {
    p.find_as::<PhotonSelection>("PhotonSelection")
}

fn leptons(p: &mut Pipeline) -> Result<&mut LeptonSelection> {
    p.find_as::<LeptonSelection>("LeptonSelection")
}

/// Replace the photon selection by `criteria`, all required; empty veto.
fn require_photon(p: &mut Pipeline, criteria: &[PhotonCriterion]) -> Result<()> {
    let sel = photons(p)?;
    sel.reset_selection();
    sel.reset_veto();
    for &c in criteria {
        sel.add_selection(true, c);
    }
    Ok(())
}

/// Isolation flavour of the hadronic-fake sideband.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Isolation {
    Nominal,
    Tight,
    Loose,
}

/// Photons failing sieie or CHIso (but within the loosened sideband),
/// vetoing events that also contain a photon passing both.
fn sideband_photon(ctx: &AssemblyContext, p: &mut Pipeline, iso: Isolation) -> Result<()> {
    let cfg = &ctx.config;
    let criteria = match iso {
        Isolation::Nominal => {
            cfg.photon_selection_with(&[Sieie, CHIsoMax], &[Sieie15, CHIsoMax11])
        }
        Isolation::Tight => cfg.photon_selection_with(
            &[Sieie, CHIsoMax],
            &[Sieie15, NHIsoTight, PhIsoTight, CHIsoMax11],
        ),
        Isolation::Loose => cfg.photon_selection_with(
            &[Sieie, NHIso, PhIso, CHIsoMax],
            &[Sieie15, NHIsoLoose, PhIsoLoose, CHIsoMax11],
        ),
    };

    let sel = photons(p)?;
    sel.reset_selection();
    sel.reset_veto();
    for &c in &criteria {
        sel.add_selection(true, c);
        sel.add_veto(true, c);
    }
    sel.add_selection(false, CriterionMask::of(&[Sieie12, CHIsoMax]));
    sel.add_veto(true, Sieie12);
    sel.add_veto(true, CHIsoMax);
    Ok(())
}

fn dilepton_mass(prefix: &str, collection: Collection) -> Mass {
    let mut mass = Mass::new(prefix);
    mass.set_min(60.0);
    mass.set_max(120.0);
    mass.set_collection1(collection);
    mass.set_collection2(collection);
    mass
}

fn scale_factor(
    ctx: &AssemblyContext,
    collection: Collection,
    name: &str,
    factors: &[&str],
    variables: (SfVariable, Option<SfVariable>),
) -> Result<IdSfWeight> {
    let mut sf = IdSfWeight::new(collection, name);
    for table in factors {
        sf.add_factor(ctx.lookup(table)?);
    }
    sf.set_n_particles(factors.len());
    sf.set_variable(variables.0, variables.1);
    Ok(sf)
}

/// Seed carrying a W decay filter that keeps only decays to `accepted`.
fn decay_seed(seed: PipelineSeed, name: &str, accepted: i32) -> Result<PipelineSeed> {
    let mut filter = LeptonicDecayFilter::named(name);
    filter.set_rejected_pdg_id(0);
    filter.set_accepted_pdg_id(accepted);
    let mut p = seed.into_pipeline();
    p.insert_operator(filter, 0)?;
    Ok(PipelineSeed::Pipeline(p))
}

// ── photon + MET ────────────────────────────────────────────────────────────

/// Full monophoton candidate selection.
pub fn monoph(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;

    if !ctx.sample.is_data {
        let sf = scale_factor(
            ctx,
            Collection::Photons,
            "photonSF",
            &[tables::PHOTON_SF],
            (SfVariable::Eta, Some(SfVariable::Pt)),
        )?;
        p.add_operator(sf)?;
        ctx.add_pdf_variation(&mut p)?;
    }

    require_photon(&mut p, &ctx.config.photon_full_selection)?;
    Ok(p)
}

/// Candidate with every cut recorded but not applied, for shape comparisons
/// between generators.
pub fn signal_raw(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monoph(ctx, seed)?;

    p.ignore_decisions(&[
        "MetFilters",
        "PhotonSelection",
        "ElectronVeto",
        "MuonVeto",
        "TauVeto",
        "PhotonMetDPhi",
        "JetMetDPhi",
        "HighMet",
    ])?;
    photons(&mut p)?.set_min_pt(30.0);

    for (prefix, collection) in [("dimu", Collection::Muons), ("diel", Collection::Electrons)] {
        let mut mass = dilepton_mass(prefix, collection);
        mass.set_ignore_decision(true);
        p.add_operator(mass)?;
    }
    Ok(p)
}

/// Candidate-like with the electron veto inverted, weighted by the
/// electron → photon fake rate.
pub fn efake(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;

    let mut weight = PhotonPtWeight::new(ctx.lookup(tables::ELECTRON_FAKE_RATE)?, "egfakerate");
    weight.set_use_errors(true);
    p.add_operator(weight)?;

    let criteria = ctx.config.photon_selection_with(&[EVeto], &[]);
    let sel = photons(&mut p)?;
    sel.reset_selection();
    sel.reset_veto();
    for &c in &criteria {
        sel.add_selection(true, c);
        sel.add_veto(true, c);
    }
    sel.add_selection(false, EVeto);
    sel.add_selection(false, CSafeVeto);
    sel.add_veto(true, EVeto);
    Ok(p)
}

/// Hadronic-fake sideband with the nominal isolation, weighted by the
/// transfer factor.
pub fn hfake(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;
    add_hadron_proxy_weight(ctx, &mut p)?;
    sideband_photon(ctx, &mut p, Isolation::Nominal)?;
    Ok(p)
}

/// Hadronic-fake sideband with tightened neutral and photon isolation.
pub fn hfake_tight(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;
    let mut weight =
        PhotonPtWeight::new(ctx.lookup(tables::HADRON_TFACTOR_TIGHT)?, "hadProxyWeight");
    weight.set_photon_type(PhotonType::Reco);
    p.add_operator(weight)?;
    sideband_photon(ctx, &mut p, Isolation::Tight)?;
    Ok(p)
}

/// Hadronic-fake sideband with loosened neutral and photon isolation.
pub fn hfake_loose(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;
    let mut weight =
        PhotonPtWeight::new(ctx.lookup(tables::HADRON_TFACTOR_LOOSE)?, "hadProxyWeight");
    weight.set_photon_type(PhotonType::Reco);
    p.add_operator(weight)?;
    sideband_photon(ctx, &mut p, Isolation::Loose)?;
    Ok(p)
}

/// Candidate-like with a hard jet and the sideband photon.
pub fn gjets(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;
    let mut jets = HighPtJetSelection::new();
    jets.set_jet_pt_cut(100.0);
    p.add_operator(jets)?;
    p.add_operator(GenPhotonDr::new())?;
    sideband_photon(ctx, &mut p, Isolation::Nominal)?;
    Ok(p)
}

/// How the MIP requirement enters a halo-enriched selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mip {
    Inverted,
    Dropped,
}

/// Shared recipe of the beam-halo regions. `sieie` replaces the nominal
/// shower-shape cut (`None` drops it).
fn halo_region(
    ctx: &AssemblyContext,
    seed: PipelineSeed,
    sieie: Option<PhotonCriterion>,
    mip: Mip,
    halo_filter: FilterMode,
) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;

    let criteria = ctx.config.photon_selection_with(&[Sieie], sieie.as_slice());
    let sel = photons(&mut p)?;
    sel.reset_selection();
    sel.reset_veto();
    for c in criteria {
        match (c, mip) {
            (MIP49, Mip::Inverted) => sel.add_selection(false, c),
            (MIP49, Mip::Dropped) => {}
            _ => sel.add_selection(true, c),
        }
    }

    p.find_as::<MetFilters>("MetFilters")?.set_filter(MetFilter::Halo, halo_filter);
    Ok(p)
}

/// Inverted MIP cut and halo tag.
pub fn halo(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie), Mip::Inverted, FilterMode::Invert)
}

/// Inverted MIP cut, halo filter not applied.
pub fn halo_mip(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie), Mip::Inverted, FilterMode::Ignore)
}

/// Halo tag only, no MIP requirement.
pub fn halo_met(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie), Mip::Dropped, FilterMode::Invert)
}

/// [`halo`] with the loose shower-shape cut.
pub fn halo_loose(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie15), Mip::Inverted, FilterMode::Invert)
}

/// [`halo_mip`] with the loose shower-shape cut.
pub fn halo_mip_loose(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie15), Mip::Inverted, FilterMode::Ignore)
}

/// [`halo_met`] with the loose shower-shape cut.
pub fn halo_met_loose(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie15), Mip::Dropped, FilterMode::Invert)
}

/// [`halo`] with the medium shower-shape cut.
pub fn halo_medium(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie12), Mip::Inverted, FilterMode::Invert)
}

/// [`halo_mip`] with the medium shower-shape cut.
pub fn halo_mip_medium(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie12), Mip::Inverted, FilterMode::Ignore)
}

/// [`halo_met`] with the medium shower-shape cut.
pub fn halo_met_medium(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, Some(Sieie12), Mip::Dropped, FilterMode::Invert)
}

/// [`halo`] without any shower-shape cut.
pub fn halo_no_shower_cut(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    halo_region(ctx, seed, None, Mip::Inverted, FilterMode::Invert)
}

/// Candidate with the non-zero sieie requirement inverted (spikes).
pub fn trivial_shower(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, seed)?;
    let criteria = ctx.config.photon_full_selection.clone();
    let sel = photons(&mut p)?;
    sel.reset_selection();
    sel.reset_veto();
    for c in criteria {
        sel.add_selection(c != SieieNonzero, c);
    }
    Ok(p)
}

/// Candidate-like W→eν selection: electron decays only, no pixel veto, low
/// photon threshold.
pub fn wenu(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monophoton_base(ctx, decay_seed(seed, "WenuFilter", 11)?)?;
    ctx.add_pdf_variation(&mut p)?;

    let criteria = ctx.config.photon_selection_with(&[EVeto], &[]);
    require_photon(&mut p, &criteria)?;
    photons(&mut p)?.set_min_pt(15.0);
    Ok(p)
}

// ── EM + jet ────────────────────────────────────────────────────────────────

/// Baseline EM object (loose sieie) for efficiency and scale factors.
pub fn purity(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = purity_base(ctx, seed)?;
    require_photon(&mut p, &[Sieie15])?;

    if !ctx.sample.is_data {
        let mut gen_photons = GenParticleSelection::named("GenPhotonSelection");
        gen_photons.set_pdg_id(22);
        gen_photons.set_min_pt(140.0);
        gen_photons.set_max_eta(1.7);
        p.insert_operator(gen_photons, 1)?;
        p.ignore_decisions(&["HighPtJetSelection"])?;
    }
    Ok(p)
}

/// EM+jet with the sideband photon, nominal isolation.
pub fn purity_nom(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = purity_base(ctx, seed)?;
    sideband_photon(ctx, &mut p, Isolation::Nominal)?;
    Ok(p)
}

/// EM+jet with the sideband photon, tight isolation.
pub fn purity_tight(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = purity_base(ctx, seed)?;
    sideband_photon(ctx, &mut p, Isolation::Tight)?;
    Ok(p)
}

/// EM+jet with the sideband photon, loose isolation.
pub fn purity_loose(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = purity_base(ctx, seed)?;
    sideband_photon(ctx, &mut p, Isolation::Loose)?;
    Ok(p)
}

// ── photon + leptons ────────────────────────────────────────────────────────

fn add_dilepton_observables(p: &mut Pipeline, prefix: &str, collection: Collection) -> Result<()> {
    let mut mass = dilepton_mass(prefix, collection);
    mass.set_ignore_decision(true);
    p.add_operator(mass)?;

    let mut sign = OppositeSign::new(prefix);
    sign.set_collection1(collection);
    sign.set_collection2(collection);
    sign.set_ignore_decision(true);
    p.add_operator(sign)
}

fn add_lepton_mt(p: &mut Pipeline, flavor: LeptonFlavor) -> Result<()> {
    let mut mt = LeptonMt::new();
    mt.set_flavor(flavor);
    mt.set_max(160.0);
    mt.set_ignore_decision(true);
    p.add_operator(mt)
}

fn add_lepton_vertex(p: &mut Pipeline, species: LeptonFlavor) -> Result<()> {
    let mut vtx = LeptonVertex::new();
    vtx.set_species(species);
    p.add_operator(vtx)
}

fn add_electron_sf(ctx: &AssemblyContext, p: &mut Pipeline, id_eta: SfVariable) -> Result<()> {
    let id = scale_factor(
        ctx,
        Collection::Electrons,
        "ElectronSF",
        &[tables::ELECTRON_TIGHT_SF],
        (id_eta, Some(SfVariable::Pt)),
    )?;
    p.add_operator(id)?;
    let track = scale_factor(
        ctx,
        Collection::Electrons,
        "GsfTrackSF",
        &[tables::ELECTRON_TRACK_SF],
        (SfVariable::Eta, Some(SfVariable::Npv)),
    )?;
    p.add_operator(track)
}

fn add_muon_sf(ctx: &AssemblyContext, p: &mut Pipeline) -> Result<()> {
    let id = scale_factor(
        ctx,
        Collection::Muons,
        "MuonSF",
        &[tables::MUON_TIGHT_SF],
        (SfVariable::AbsEta, Some(SfVariable::Pt)),
    )?;
    p.add_operator(id)?;
    let track = scale_factor(
        ctx,
        Collection::Muons,
        "MuonTrackSF",
        &[tables::MUON_TRACK_SF],
        (SfVariable::Npv, None),
    )?;
    p.add_operator(track)
}

/// Photon + two electrons.
pub fn diel(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = electron_base(ctx, seed)?;
    leptons(&mut p)?.set_n(2, 0);
    add_dilepton_observables(&mut p, "diel", Collection::Electrons)?;

    if !ctx.sample.is_data {
        let id = scale_factor(
            ctx,
            Collection::Electrons,
            "ElectronSF",
            &[tables::ELECTRON_TIGHT_SF, tables::ELECTRON_LOOSE_SF],
            (SfVariable::Eta, Some(SfVariable::Pt)),
        )?;
        p.add_operator(id)?;
        let track = scale_factor(
            ctx,
            Collection::Electrons,
            "GsfTrackSF",
            &[tables::ELECTRON_TRACK_SF, tables::ELECTRON_TRACK_SF],
            (SfVariable::Eta, Some(SfVariable::Npv)),
        )?;
        p.add_operator(track)?;
    }
    Ok(p)
}

/// [`diel`] with strict tight electrons, a lepton vertex and any photon
/// passing H/E.
pub fn diel_all_photon(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = diel(ctx, seed)?;
    add_lepton_vertex(&mut p, LeptonFlavor::Electron)?;

    let sel = leptons(&mut p)?;
    sel.set_strict_el(true);
    sel.set_require_tight(true);

    let photon = photons(&mut p)?;
    photon.reset_selection();
    photon.add_selection(true, HOverE);
    Ok(p)
}

/// [`diel`] weighted as a hadronic-fake proxy.
pub fn diel_hfake(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = diel(ctx, seed)?;
    add_hadron_proxy_weight(ctx, &mut p)?;
    Ok(p)
}

fn monoel_with(ctx: &AssemblyContext, seed: PipelineSeed, id_eta: SfVariable) -> Result<Pipeline> {
    let mut p = electron_base(ctx, seed)?;
    leptons(&mut p)?.set_n(1, 0);
    add_lepton_mt(&mut p, LeptonFlavor::Electron)?;

    let mut met = HighMet::named("RealMetCut");
    met.set_met_source(MetSource::Input);
    met.set_threshold(50.0);
    met.set_ignore_decision(true);
    p.add_operator(met)?;

    if !ctx.sample.is_data {
        add_electron_sf(ctx, &mut p, id_eta)?;
    }
    Ok(p)
}

/// Photon + one electron (W→eν control region).
pub fn monoel(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    monoel_with(ctx, seed, SfVariable::Eta)
}

/// [`monoel`] weighted as a hadronic-fake proxy.
pub fn monoel_hfake(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monoel_with(ctx, seed, SfVariable::AbsEta)?;
    add_hadron_proxy_weight(ctx, &mut p)?;
    Ok(p)
}

/// Photon + two muons.
pub fn dimu(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = muon_base(ctx, seed)?;
    leptons(&mut p)?.set_n(0, 2);
    add_dilepton_observables(&mut p, "dimu", Collection::Muons)?;

    if !ctx.sample.is_data {
        let id = scale_factor(
            ctx,
            Collection::Muons,
            "MuonSF",
            &[tables::MUON_TIGHT_SF, tables::MUON_LOOSE_SF],
            (SfVariable::AbsEta, Some(SfVariable::Pt)),
        )?;
        p.add_operator(id)?;
        let track = scale_factor(
            ctx,
            Collection::Muons,
            "MuonTrackSF",
            &[tables::MUON_TRACK_SF, tables::MUON_TRACK_SF],
            (SfVariable::Npv, None),
        )?;
        p.add_operator(track)?;
    }
    Ok(p)
}

/// [`dimu`] with strict medium muons, a lepton vertex and any photon
/// passing H/E.
pub fn dimu_all_photon(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = dimu(ctx, seed)?;
    add_lepton_vertex(&mut p, LeptonFlavor::Muon)?;

    let sel = leptons(&mut p)?;
    sel.set_strict_mu(true);
    sel.set_require_tight(false);
    sel.set_require_medium(true);

    let photon = photons(&mut p)?;
    photon.reset_selection();
    photon.add_selection(true, HOverE);
    Ok(p)
}

/// [`dimu`] weighted as a hadronic-fake proxy.
pub fn dimu_hfake(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = dimu(ctx, seed)?;
    add_hadron_proxy_weight(ctx, &mut p)?;
    Ok(p)
}

/// Photon + one muon (W→μν control region).
pub fn monomu(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = muon_base(ctx, seed)?;
    leptons(&mut p)?.set_n(0, 1);
    add_lepton_mt(&mut p, LeptonFlavor::Muon)?;

    if !ctx.sample.is_data {
        add_muon_sf(ctx, &mut p)?;
    }
    Ok(p)
}

/// [`monomu`] with strict medium muons, a lepton vertex and any photon
/// passing H/E.
pub fn monomu_all_photon(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monomu(ctx, seed)?;
    add_lepton_vertex(&mut p, LeptonFlavor::Muon)?;

    let sel = leptons(&mut p)?;
    sel.set_strict_mu(true);
    sel.set_require_medium(true);

    let photon = photons(&mut p)?;
    photon.reset_selection();
    photon.add_selection(true, HOverE);
    Ok(p)
}

/// [`monomu`] weighted as a hadronic-fake proxy.
pub fn monomu_hfake(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monomu(ctx, seed)?;
    add_hadron_proxy_weight(ctx, &mut p)?;
    Ok(p)
}

/// Photon + one electron + one muon (top control region).
pub fn elmu(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = muon_base(ctx, seed)?;
    leptons(&mut p)?.set_n(1, 1);

    if !ctx.sample.is_data {
        add_electron_sf(ctx, &mut p, SfVariable::AbsEta)?;
        add_muon_sf(ctx, &mut p)?;
    }
    Ok(p)
}

/// [`monoel`] restricted to W→eν decays, with a lepton vertex.
pub fn monoel_vertex(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monoel(ctx, decay_seed(seed, "WlnuFilter", 11)?)?;
    add_lepton_vertex(&mut p, LeptonFlavor::Electron)?;
    Ok(p)
}

/// [`monomu`] restricted to W→μν decays, medium muons, with a lepton vertex.
pub fn monomu_vertex(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = monomu(ctx, decay_seed(seed, "WlnuFilter", 13)?)?;
    let sel = leptons(&mut p)?;
    sel.set_require_tight(false);
    sel.set_require_medium(true);
    add_lepton_vertex(&mut p, LeptonFlavor::Muon)?;
    Ok(p)
}

/// [`diel`] restricted to electron decays, with a lepton vertex.
pub fn diel_vertex(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = diel(ctx, decay_seed(seed, "WlnuFilter", 11)?)?;
    add_lepton_vertex(&mut p, LeptonFlavor::Electron)?;
    Ok(p)
}

/// [`dimu`] restricted to muon decays, tight muons, with a lepton vertex.
pub fn dimu_vertex(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = dimu(ctx, decay_seed(seed, "WlnuFilter", 13)?)?;
    leptons(&mut p)?.set_require_tight(true);
    add_lepton_vertex(&mut p, LeptonFlavor::Muon)?;
    Ok(p)
}

// ── Z tag and probe ─────────────────────────────────────────────────────────

fn z_base(
    ctx: &AssemblyContext,
    seed: PipelineSeed,
    trigger: &str,
    species: Collection,
) -> Result<Pipeline> {
    let mut p = tag_and_probe_base(ctx, seed)?;
    if ctx.sample.is_data {
        p.insert_operator(HltFilter::new(trigger), 0)?;
    }
    let pair = p.find_as::<TagAndProbePairZ>("TagAndProbePairZ")?;
    pair.set_tag_species(species);
    pair.set_probe_species(species);
    Ok(p)
}

fn add_back_to_back_jet(p: &mut Pipeline) -> Result<()> {
    let mut b2b = ZJetBackToBack::new(p.handle("TagAndProbePairZ")?);
    b2b.set_min_jet_pt(100.0);
    b2b.set_min_delta_phi(3.0);
    p.add_operator(b2b)
}

/// Z→ee tag and probe.
pub fn zee_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    z_base(ctx, seed, &ctx.config.electron_trigger, Collection::Electrons)
}

/// Z→ee recoiling against a hard jet.
pub fn zee_jets(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = zee_base(ctx, seed)?;
    add_back_to_back_jet(&mut p)?;
    Ok(p)
}

/// Z→μμ tag and probe.
pub fn zmm_base(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    z_base(ctx, seed, &ctx.config.dimuon_trigger, Collection::Muons)
}

/// Z→μμ recoiling against a hard jet.
pub fn zmm_jets(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = zmm_base(ctx, seed)?;
    add_back_to_back_jet(&mut p)?;
    Ok(p)
}

/// Plain dimuon selection in the Z window; never photon-skimmed.
pub fn zmumu(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = seed.into_pipeline();
    p.set_can_photon_skim(false)?;

    p.add_operator(MetFilters::new())?;
    let mut sel = LeptonSelection::new();
    sel.set_n(0, 2);
    sel.set_strict_mu(false);
    sel.set_require_tight(false);
    p.add_operator(sel)?;
    p.add_operator(dilepton_mass("dimu", Collection::Muons))?;

    if !ctx.sample.is_data {
        ctx.add_mc_weights(&mut p)?;
        ctx.add_pdf_variation(&mut p)?;
    }
    Ok(p)
}

// ── photon tag and probe ────────────────────────────────────────────────────

/// Electron tag, photon probe.
pub fn tpeg(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = tagprobe_base(ctx, seed)?;
    p.add_operator(TagProbePhoton::electron())?;
    Ok(p)
}

/// Muon tag, photon probe.
pub fn tpmg(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = tagprobe_base(ctx, seed)?;
    p.add_operator(TagProbePhoton::muon())?;
    Ok(p)
}

fn low_pt(mut tp: TagProbePhoton) -> TagProbePhoton {
    tp.set_min_probe_pt(25.0);
    tp.set_min_tag_pt(30.0);
    tp.set_tag_trigger_match(true);
    tp
}

/// [`tpeg`] at low pT with a trigger-matched tag; bypasses the photon skim.
pub fn tpeg_low_pt(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = tagprobe_base(ctx, seed)?;
    p.add_operator(low_pt(TagProbePhoton::electron()))?;
    p.set_can_photon_skim(false)?;
    Ok(p)
}

/// [`tpmg`] at low pT with a trigger-matched tag; bypasses the photon skim.
pub fn tpmg_low_pt(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = tagprobe_base(ctx, seed)?;
    p.add_operator(low_pt(TagProbePhoton::muon()))?;
    p.set_can_photon_skim(false)?;
    Ok(p)
}

/// Two muon tags, photon probe (Z→μμγ).
pub fn tpmmg(ctx: &AssemblyContext, seed: PipelineSeed) -> Result<Pipeline> {
    let mut p = tagprobe_base(ctx, seed)?;
    let mut tp = TagProbePhoton::muon();
    tp.set_mode(TagProbeMode::Double);
    p.add_operator(tp)?;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::SampleDescriptor;
    use mx_tables::{BinnedTable, TableStore};
    use std::sync::Arc;

    fn store() -> Arc<TableStore> {
        let mut s = TableStore::new();
        s.insert_pileup("Summer16", BinnedTable::constant("", 1.0)).unwrap();
        for name in [
            tables::PHOTON_SF,
            tables::ELECTRON_TIGHT_SF,
            tables::ELECTRON_LOOSE_SF,
            tables::ELECTRON_TRACK_SF,
            tables::MUON_TIGHT_SF,
            tables::MUON_LOOSE_SF,
            tables::MUON_TRACK_SF,
            tables::HADRON_TFACTOR,
            tables::HADRON_TFACTOR_PURITY_UP,
            tables::HADRON_TFACTOR_PURITY_DOWN,
            tables::ELECTRON_FAKE_RATE,
        ] {
            s.insert_table(name, BinnedTable::constant("", 1.0)).unwrap();
        }
        Arc::new(s)
    }

    fn mc() -> AssemblyContext {
        AssemblyContext::new(
            SampleDescriptor::simulation("zg", "ZGTo2LG_Summer16_amcatnlo", 1.0, 1.0),
            store(),
        )
    }

    fn data() -> AssemblyContext {
        AssemblyContext::new(SampleDescriptor::data("sph-16b", "SinglePhoton_Run2016B"), store())
    }

    #[test]
    fn hfake_inverts_sieie_or_chiso() {
        let mut p = hfake(&data(), "hfake".into()).unwrap();
        assert!(p.contains("hadProxyWeight"));
        let sel = photons(&mut p).unwrap();
        let (expected, mask) = *sel.selection().entries().last().unwrap();
        assert!(!expected);
        assert!(mask.contains(Sieie12) && mask.contains(CHIsoMax));
        assert_eq!(sel.veto().len(), sel.selection().len() + 1);
    }

    #[test]
    fn halo_inverts_mip_and_filter() {
        let mut p = halo(&data(), "halo".into()).unwrap();
        let filters = p.find_as::<MetFilters>("MetFilters").unwrap();
        assert_eq!(filters.mode(MetFilter::Halo), FilterMode::Invert);
        let sel = photons(&mut p).unwrap();
        assert!(sel.selection().entries().contains(&(false, MIP49.into())));
        assert!(sel.veto().is_empty());

        let mut p = halo_met_medium(&data(), "h".into()).unwrap();
        let sel = photons(&mut p).unwrap();
        assert!(sel.selection().entries().iter().all(|(_, m)| !m.contains(MIP49)));
        assert!(sel.selection().entries().contains(&(true, Sieie12.into())));
    }

    #[test]
    fn signal_raw_records_every_cut() {
        let p = signal_raw(&mc(), "signalRaw".into()).unwrap();
        let ignored: Vec<_> =
            p.describe().into_iter().filter(|s| s.ignore_decision).map(|s| s.name).collect();
        for name in ["MetFilters", "PhotonSelection", "ElectronVeto", "MuonVeto", "HighMet"] {
            assert!(ignored.iter().any(|n| n == name), "{name}");
        }
        assert!(ignored.iter().any(|n| n == "dimuMass"));
        assert!(p.contains("dielMass"));
        assert!(p.contains("NNPDFVariation"));
    }

    #[test]
    fn lepton_regions() {
        let p = diel(&mc(), "diel".into()).unwrap();
        for name in ["dielMass", "dielSign", "ElectronSF", "GsfTrackSF", "RealMetVar"] {
            assert!(p.contains(name), "{name}");
        }

        let p = monoel_hfake(&data(), "monoelHfake".into()).unwrap();
        assert_eq!(p.operator_names().last(), Some(&"hadProxyWeight"));
        assert!(p.contains("RealMetCut"));

        let p = elmu(&mc(), "elmu".into()).unwrap();
        for name in ["ElectronSF", "GsfTrackSF", "MuonSF", "MuonTrackSF"] {
            assert!(p.contains(name), "{name}");
        }
    }

    #[test]
    fn vertex_regions_carry_a_decay_filter() {
        let p = dimu_vertex(&mc(), "dimuVertex".into()).unwrap();
        assert_eq!(p.operator_names()[0], "WlnuFilter");
        assert_eq!(p.operator_names().last(), Some(&"LeptonVertex"));
    }

    #[test]
    fn z_regions() {
        let p = zmm_jets(&data(), "zmmJets".into()).unwrap();
        assert_eq!(p.operator_names()[0], "HLT_IsoMu20_OR_HLT_IsoTkMu20");
        let edges = p.dependency_edges();
        assert!(edges.contains(&("ZJetBackToBack".into(), "TagAndProbePairZ".into())));

        let p = zmumu(&mc(), "zmumu".into()).unwrap();
        assert!(!p.can_photon_skim());
        assert_eq!(p.operator_names()[..3], ["MetFilters", "LeptonSelection", "dimuMass"]);
    }

    #[test]
    fn photon_tag_and_probe() {
        let p = tpeg_low_pt(&data(), "tpegLowPt".into()).unwrap();
        assert!(!p.can_photon_skim());
        assert!(p.contains("TPElectronPhoton"));

        let p = tpmmg(&mc(), "tpmmg".into()).unwrap();
        assert_eq!(p.operator_names(), vec!["PUWeight", "TPMuonPhoton"]);
    }

    #[test]
    fn missing_fake_rate_table_fails_assembly() {
        let ctx = AssemblyContext::new(
            SampleDescriptor::data("sph-16b", "SinglePhoton"),
            Arc::new(TableStore::new()),
        );
        assert!(matches!(efake(&ctx, "efake".into()), Err(mx_core::Error::Configuration(_))));
    }
}
