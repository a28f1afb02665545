use std::sync::Arc;

use approx::assert_relative_eq;
use mx_core::{Error, SampleDescriptor};
use mx_pipeline::{Event, Pipeline};
use mx_regions::assembler::tables;
use mx_regions::{AssemblyContext, PipelineSeed, RegionCatalog, RegionConfig, decorate, decorators};
use mx_tables::{BinnedTable, TableStore};

fn store() -> Arc<TableStore> {
    let mut s = TableStore::new();
    let profile = BinnedTable::one_d("", &[0.0, 30.0, 80.0], &[1.2, 0.8]).unwrap();
    s.insert_pileup("Summer16", profile).unwrap();
    for name in [tables::PHOTON_SF, tables::HADRON_TFACTOR] {
        s.insert_table(name, BinnedTable::constant("", 1.0)).unwrap();
    }
    s.insert_table(tables::HADRON_TFACTOR_PURITY_UP, BinnedTable::constant("", 1.1)).unwrap();
    s.insert_table(tables::HADRON_TFACTOR_PURITY_DOWN, BinnedTable::constant("", 0.9)).unwrap();
    Arc::new(s)
}

fn simulation(name: &str, identifier: &str) -> AssemblyContext {
    AssemblyContext::new(SampleDescriptor::simulation(name, identifier, 10.0, 1000.0), store())
}

#[test]
fn crosssection_contributes_exactly_the_normalization() {
    let ctx = simulation("gg-80", "GGJets_M-80_Summer16");
    let p = RegionCatalog::standard().build(&ctx, "monoph", "monoph", &[]).unwrap();

    let summary = p.describe();
    let xs = summary.iter().find(|s| s.name == "crosssection").unwrap();
    assert!(xs.produces_weight && !xs.produces_decision);

    // Weights multiply whether or not the event passes.
    let out = p.run(&Event { true_pileup: 50.0, ..Default::default() });
    assert!(!out.accepted);
    assert_relative_eq!(out.weight, 0.01 * 0.8, epsilon = 1e-12);
}

#[test]
fn missing_pileup_profile_aborts_assembly() {
    let ctx = simulation("gg-80", "GGJets_M-80_Fall15");
    let err = RegionCatalog::standard().build(&ctx, "monoph", "monoph", &[]).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn simulation_without_sum_of_weights_is_rejected() {
    let catalog = RegionCatalog::standard();
    for sum_weights in [0.0, -5.0] {
        let sample =
            SampleDescriptor::simulation("gg-80", "GGJets_M-80_Summer16", 10.0, sum_weights);
        let ctx = AssemblyContext::new(sample, store());
        let err = catalog.build(&ctx, "monoph", "monoph", &[]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
        assert!(err.to_string().contains("gg-80"));
    }

    // Data never carries a normalization.
    let data = AssemblyContext::new(SampleDescriptor::data("sph-16b", "SinglePhoton"), store());
    assert!(catalog.build(&data, "monoph", "monoph", &[]).is_ok());
}

#[test]
fn inner_decorator_stages_come_first() {
    let catalog = RegionCatalog::standard();
    let ctx = simulation("gg-80", "GGJets_M-80_Summer16");

    let monoph = catalog.assembler("monoph").unwrap();
    let f = decorate(monoph, &[decorators::dph, decorators::had_proxy]);
    let p = f(&ctx, PipelineSeed::from("monophDph")).unwrap();
    let names = p.operator_names();
    let recoil = names.iter().position(|n| *n == "PhotonRecoil").unwrap();
    let proxy = names.iter().position(|n| *n == "hadProxyWeight").unwrap();
    assert!(recoil < proxy);
    assert_eq!(proxy, names.len() - 1);

    let swapped = catalog
        .build(&ctx, "monophDph", "monoph", &["had_proxy".into(), "dph".into()])
        .unwrap();
    assert_eq!(swapped.operator_names().last(), Some(&"PhotonRecoil"));
    assert!(swapped.variation_names().contains("purityUp"));
}

#[test]
fn wlnu_filter_runs_before_the_trigger_free_chain() {
    let ctx = simulation("wlnu-100", "WJetsToLNu_HT-100To200_Summer16");
    let p = RegionCatalog::standard()
        .build(&ctx, "monoph", "monoph", &["wlnu".into(), "genveto".into()])
        .unwrap();
    assert_eq!(&p.operator_names()[..3], ["GenPhotonVeto", "WlnuFilter", "MetFilters"]);
    assert!(p.dependency_violations().is_empty());
}

#[test]
fn every_catalogue_region_assembles_for_data() {
    let mut store = TableStore::new();
    for name in [
        tables::ELECTRON_FAKE_RATE,
        tables::HADRON_TFACTOR,
        tables::HADRON_TFACTOR_PURITY_UP,
        tables::HADRON_TFACTOR_PURITY_DOWN,
        tables::HADRON_TFACTOR_TIGHT,
        tables::HADRON_TFACTOR_LOOSE,
    ] {
        store.insert_table(name, BinnedTable::constant("", 0.1)).unwrap();
    }
    let ctx = AssemblyContext::new(
        SampleDescriptor::data("sph-16b", "SinglePhoton_Run2016B"),
        Arc::new(store),
    );

    let catalog = RegionCatalog::standard();
    for name in catalog.names() {
        let p: Pipeline = catalog
            .build(&ctx, name, name, &[])
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert_eq!(p.name(), name);
        assert!(p.dependency_violations().is_empty(), "{name}");
    }
}

#[test]
fn region_config_defaults_to_its_own_assembler() {
    let region = RegionConfig::new("hfakeTight").with_assembler("hfake_tight");
    assert_eq!(region.assembler_name(), "hfake_tight");
    assert_eq!(RegionConfig::new("monoph").with_decorator("kfactor").assembler_name(), "monoph");
}
