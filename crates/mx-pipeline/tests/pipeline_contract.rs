//! Integration tests: the decision/weight combination contract and the
//! mutation protocol of `Pipeline`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mx_core::{Error, Evaluation};
use mx_pipeline::operators::{
    ConstantWeight, CopyMet, HighMet, JetMetDPhi, MetVariations, PhotonJetDPhi, PhotonMetDPhi,
    PhotonSelection,
};
use mx_pipeline::{Event, EventContext, Operator, OperatorCore, OperatorHandle, Pipeline};

/// Fixed decision/weight, counting its calls.
struct Scripted {
    core: OperatorCore,
    decision: Option<bool>,
    weight: Option<f64>,
    variations: Vec<(String, f64)>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn decide(name: &str, pass: bool) -> Self {
        Self {
            core: OperatorCore::new(name),
            decision: Some(pass),
            weight: None,
            variations: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn weigh(name: &str, w: f64) -> Self {
        Self { decision: None, weight: Some(w), ..Self::decide(name, true) }
    }

    fn with_variation(mut self, name: &str, w: f64) -> Self {
        self.variations.push((name.into(), w));
        self
    }
}

impl Operator for Scripted {
    mx_pipeline::operator_common!("Scripted");

    fn produces_decision(&self) -> bool {
        self.decision.is_some()
    }

    fn produces_weight(&self) -> bool {
        self.weight.is_some()
    }

    fn variation_names(&self) -> Vec<String> {
        self.variations.iter().map(|(n, _)| n.clone()).collect()
    }

    fn evaluate(&self, _ctx: &mut EventContext<'_>) -> Evaluation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut e = Evaluation { decision: self.decision, ..Evaluation::default() };
        e.weight = self.weight;
        for (n, w) in &self.variations {
            e = e.with_variation(n.clone(), *w);
        }
        e
    }
}

/// Reads the recorded decision of an ignorable stage.
struct Echo {
    core: OperatorCore,
    source: OperatorHandle,
}

impl Operator for Echo {
    mx_pipeline::operator_common!("Echo");

    fn dependencies(&self) -> Vec<OperatorHandle> {
        vec![self.source.clone()]
    }

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        Evaluation::decision(ctx.decision_of(&self.source).unwrap_or(true))
    }
}

#[test]
fn no_short_circuit() {
    let late = Scripted::decide("Late", true);
    let calls = Arc::clone(&late.calls);

    let mut p = Pipeline::new("r");
    p.add_operator(Scripted::decide("Early", false)).unwrap();
    p.add_operator(late).unwrap();

    let out = p.run(&Event::default());
    assert!(!out.accepted);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.decisions, vec![Some(false), Some(true)]);
}

#[test]
fn ignorable_decisions_are_excluded() {
    let build = |last: bool| {
        let mut p = Pipeline::new("r");
        p.add_operator(Scripted::decide("A", true)).unwrap();
        p.add_operator(Scripted::decide("B", false)).unwrap();
        p.add_operator(Scripted::decide("C", last)).unwrap();
        p.ignore_decisions(&["B"]).unwrap();
        p
    };
    assert!(!build(false).run(&Event::default()).accepted);

    let out = build(true).run(&Event::default());
    assert!(out.accepted);
    // still computed and recorded
    assert_eq!(out.decisions[1], Some(false));
}

#[test]
fn ignored_decision_can_be_consumed_explicitly() {
    let mut p = Pipeline::new("r");
    p.add_operator(Scripted::decide("Veto", false)).unwrap();
    p.ignore_decisions(&["Veto"]).unwrap();
    let source = p.handle("Veto").unwrap();
    p.add_operator(Echo { core: OperatorCore::new("Echo"), source }).unwrap();

    let out = p.run(&Event::default());
    assert_eq!(out.decisions, vec![Some(false), Some(false)]);
    assert!(!out.accepted);
}

#[test]
fn weights_multiply_regardless_of_decision() {
    for pass in [true, false] {
        let mut p = Pipeline::new("r");
        p.add_operator(Scripted::weigh("W1", 2.0)).unwrap();
        p.add_operator(Scripted::weigh("W2", 0.5)).unwrap();
        p.add_operator(Scripted::decide("D", pass)).unwrap();
        let out = p.run(&Event::default());
        assert_eq!(out.weight, 1.0);
        assert_eq!(out.accepted, pass);
    }
}

#[test]
fn variation_substitutes_one_factor() {
    let mut p = Pipeline::new("r");
    p.add_operator(Scripted::weigh("A", 2.0).with_variation("up", 3.0)).unwrap();
    p.add_operator(Scripted::weigh("B", 5.0)).unwrap();

    let out = p.run(&Event::default());
    assert_eq!(out.weight, 10.0);
    assert_eq!(out.variations["up"], 15.0);
    assert_eq!(p.variation_names().into_iter().collect::<Vec<_>>(), vec!["up"]);
}

#[test]
fn lookup_by_name() {
    let mut p = Pipeline::new("r");
    p.add_operator(HighMet::new()).unwrap();

    p.find_as::<HighMet>("HighMet").unwrap().set_threshold(50.0);
    assert_eq!(p.find_as::<HighMet>("HighMet").unwrap().threshold(), 50.0);
    assert_eq!(p.find_operator("HighMet").unwrap().name(), "HighMet");

    assert!(matches!(p.add_operator(HighMet::new()), Err(Error::DuplicateName { .. })));
    assert!(matches!(p.find_operator("Nope"), Err(Error::NotFound { .. })));
    assert!(matches!(p.find_as::<CopyMet>("HighMet"), Err(Error::TypeMismatch { .. })));
}

#[test]
fn insert_at_front_runs_first() {
    let mut p = Pipeline::new("r");
    p.add_operator(Scripted::decide("A", true)).unwrap();
    p.insert_operator(Scripted::decide("B", true), 0).unwrap();
    assert_eq!(p.operator_names(), vec!["B", "A"]);
    assert_eq!(p.describe()[0].name, "B");
}

#[test]
fn cross_section_factor() {
    let mut p = Pipeline::new("r");
    p.add_operator(ConstantWeight::new(10.0 / 1000.0, "crosssection")).unwrap();
    let out = p.run(&Event::default());
    assert_eq!(out.weight, 0.01);
}

#[test]
fn met_variation_wiring() {
    let mut p = Pipeline::new("monoph");
    p.add_operator(PhotonSelection::new()).unwrap();
    p.add_operator(CopyMet::new()).unwrap();
    p.add_operator(MetVariations::new()).unwrap();
    p.add_operator(PhotonMetDPhi::new()).unwrap();
    p.add_operator(JetMetDPhi::new()).unwrap();
    p.add_operator(PhotonJetDPhi::new()).unwrap();

    let photons = p.handle("PhotonSelection").unwrap();
    p.find_as::<MetVariations>("MetVariations").unwrap().set_photon_selection(photons);
    let vars = p.handle("MetVariations").unwrap();
    p.find_as::<PhotonMetDPhi>("PhotonMetDPhi").unwrap().set_met_variations(vars.clone());
    p.find_as::<JetMetDPhi>("JetMetDPhi").unwrap().set_met_variations(vars.clone());
    p.find_as::<PhotonJetDPhi>("PhotonJetDPhi").unwrap().set_met_variations(vars);

    assert!(p.dependency_violations().is_empty());
    let edges = p.dependency_edges();
    assert_eq!(edges.len(), 4);
    assert!(edges.contains(&("PhotonJetDPhi".into(), "MetVariations".into())));

    let out = p.run(&Event::default());
    // no photon: the selection and the photon-MET angle fail
    assert!(!out.accepted);
    assert!(out.event.observables.contains_key("t1MetJECUp"));
}

#[test]
fn frozen_pipeline_refuses_mutation() {
    let mut p = Pipeline::new("r");
    p.add_operator(HighMet::new()).unwrap();
    p.run(&Event::default());
    assert!(matches!(p.find_as::<HighMet>("HighMet"), Err(Error::Frozen(_))));
    assert!(matches!(p.set_name("other"), Err(Error::Frozen(_))));
    assert!(matches!(p.ignore_decisions(&["HighMet"]), Err(Error::Frozen(_))));
}

#[test]
fn pipelines_run_in_parallel() {
    use rayon::prelude::*;

    let mut p = Pipeline::new("r");
    p.add_operator(Scripted::weigh("W", 2.0)).unwrap();
    let events = vec![Event::default(); 64];
    let total: f64 = events.par_iter().map(|e| p.run(e).weight).sum();
    assert_eq!(total, 128.0);
}
