//! Ordered operator chain and the decision/weight combination algorithm.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use mx_core::{Error, Result};
use serde::Serialize;

use crate::context::EventContext;
use crate::event::{Event, SkimEvent};
use crate::operator::{Operator, OperatorHandle, OperatorId};

/// Result of running one event through a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// AND over the non-ignorable decisions.
    pub accepted: bool,
    /// Product of the nominal weight contributions.
    pub weight: f64,
    /// Variation name → product with that variation swapped in.
    pub variations: BTreeMap<String, f64>,
    /// Per-operator decision in execution order (`None` for non-deciding stages).
    pub decisions: Vec<Option<bool>>,
    /// The filled output event.
    pub event: SkimEvent,
}

/// Serializable summary of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorSummary {
    /// Execution position.
    pub position: usize,
    /// Operator name.
    pub name: String,
    /// Operator type.
    pub kind: &'static str,
    /// Gates events.
    pub produces_decision: bool,
    /// Weights events.
    pub produces_weight: bool,
    /// Decision excluded from the AND.
    pub ignore_decision: bool,
    /// Names of the producers this stage reads.
    pub dependencies: Vec<String>,
    /// Weight variations reported.
    pub variations: Vec<String>,
}

/// An ordered, name-indexed chain of operators.
///
/// Operators execute in insertion order. The pipeline may be reshaped freely
/// until the first call to [`run`](Self::run) (or [`freeze`](Self::freeze));
/// afterwards every mutating accessor fails with [`Error::Frozen`].
pub struct Pipeline {
    name: String,
    operators: Vec<Box<dyn Operator>>,
    index: HashMap<String, usize>,
    photon_skim: bool,
    frozen: AtomicBool,
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operators: Vec::new(),
            index: HashMap::new(),
            photon_skim: true,
            frozen: AtomicBool::new(false),
        }
    }

    /// Pipeline (region) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the pipeline; used when a seed pipeline is reused for a region.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.name = name.into();
        Ok(())
    }

    /// Whether events entering this region may be pre-filtered by the
    /// common photon preselection.
    pub fn can_photon_skim(&self) -> bool {
        self.photon_skim
    }

    /// Opt the region in or out of the common photon preselection.
    pub fn set_can_photon_skim(&mut self, allowed: bool) -> Result<()> {
        self.ensure_mutable()?;
        self.photon_skim = allowed;
        Ok(())
    }

    /// Number of operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether the pipeline has no operators.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Append an operator.
    pub fn add_operator(&mut self, op: impl Operator) -> Result<()> {
        let len = self.operators.len();
        self.insert_boxed(Box::new(op), len)
    }

    /// Insert an operator at `index` (`0..=len`); index 0 is the slot for
    /// stages that must see the raw input first.
    pub fn insert_operator(&mut self, op: impl Operator, index: usize) -> Result<()> {
        self.insert_boxed(Box::new(op), index)
    }

    /// Insert an already boxed operator at `index`.
    pub fn insert_boxed(&mut self, mut op: Box<dyn Operator>, index: usize) -> Result<()> {
        self.ensure_mutable()?;
        if self.index.contains_key(op.name()) {
            let name = op.name().to_string();
            return Err(Error::DuplicateName { pipeline: self.name.clone(), name });
        }
        if index > self.operators.len() {
            return Err(Error::IndexOutOfRange {
                pipeline: self.name.clone(),
                index,
                len: self.operators.len(),
            });
        }
        op.core_mut().assign_id(OperatorId::next());
        self.operators.insert(index, op);
        self.reindex();
        Ok(())
    }

    fn reindex(&mut self) {
        self.index =
            self.operators.iter().enumerate().map(|(i, op)| (op.name().to_string(), i)).collect();
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_frozen() { Err(Error::Frozen(self.name.clone())) } else { Ok(()) }
    }

    fn position_or_err(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound { pipeline: self.name.clone(), name: name.into() })
    }

    /// Whether an operator with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Execution position of an operator.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Shared access to an operator by name.
    pub fn get(&self, name: &str) -> Result<&dyn Operator> {
        let i = self.position_or_err(name)?;
        Ok(self.operators[i].as_ref())
    }

    /// Mutable access to an operator by name.
    pub fn find_operator(&mut self, name: &str) -> Result<&mut dyn Operator> {
        self.ensure_mutable()?;
        let i = self.position_or_err(name)?;
        Ok(self.operators[i].as_mut())
    }

    /// Mutable access to an operator by name, downcast to its concrete type.
    pub fn find_as<T: Operator>(&mut self, name: &str) -> Result<&mut T> {
        let pipeline = self.name.clone();
        let op = self.find_operator(name)?;
        let actual = op.kind();
        op.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
            log::debug!("pipeline '{pipeline}': '{name}' is a {actual}");
            Error::TypeMismatch { name: name.into(), expected: short_type_name::<T>(), actual }
        })
    }

    /// Set the ignore flag on each named operator.
    pub fn ignore_decisions(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.find_operator(name)?.set_ignore_decision(true);
        }
        Ok(())
    }

    /// Dependency reference to an operator already in the pipeline.
    pub fn handle(&self, name: &str) -> Result<OperatorHandle> {
        let i = self.position_or_err(name)?;
        let op = &self.operators[i];
        Ok(OperatorHandle::new(op.id(), op.name()))
    }

    /// Operators in execution order.
    pub fn operators(&self) -> impl Iterator<Item = &dyn Operator> {
        self.operators.iter().map(|op| op.as_ref())
    }

    /// Operator names in execution order.
    pub fn operator_names(&self) -> Vec<&str> {
        self.operators.iter().map(|op| op.name()).collect()
    }

    /// Every variation name declared anywhere in the chain.
    pub fn variation_names(&self) -> BTreeSet<String> {
        self.operators
            .iter()
            .filter(|op| op.produces_weight())
            .flat_map(|op| op.variation_names())
            .collect()
    }

    /// (consumer, producer) name pairs.
    pub fn dependency_edges(&self) -> Vec<(String, String)> {
        self.operators
            .iter()
            .flat_map(|op| {
                op.dependencies().into_iter().map(|h| (op.name().to_string(), h.name().to_string()))
            })
            .collect()
    }

    /// Consumers that run before (or without) the producer they read.
    pub fn dependency_violations(&self) -> Vec<String> {
        let position: HashMap<OperatorId, usize> =
            self.operators.iter().enumerate().map(|(i, op)| (op.id(), i)).collect();

        let mut out = Vec::new();
        for (i, op) in self.operators.iter().enumerate() {
            for dep in op.dependencies() {
                let (consumer, producer) = (op.name(), dep.name());
                match position.get(&dep.id()) {
                    Some(&p) if p < i => {}
                    Some(_) => {
                        out.push(format!("'{consumer}' runs before its producer '{producer}'"))
                    }
                    None => out.push(format!(
                        "'{consumer}' reads '{producer}', which is not in the pipeline"
                    )),
                }
            }
        }
        out
    }

    /// Stage-by-stage summary.
    pub fn describe(&self) -> Vec<OperatorSummary> {
        self.operators
            .iter()
            .enumerate()
            .map(|(position, op)| OperatorSummary {
                position,
                name: op.name().to_string(),
                kind: op.kind(),
                produces_decision: op.produces_decision(),
                produces_weight: op.produces_weight(),
                ignore_decision: op.ignore_decision(),
                dependencies: op.dependencies().iter().map(|h| h.name().to_string()).collect(),
                variations: op.variation_names(),
            })
            .collect()
    }

    /// Whether the pipeline refuses further mutation.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Refuse further mutation. Called implicitly by the first `run`.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            let violations = self.dependency_violations();
            for v in &violations {
                log::warn!("pipeline '{}': {v}", self.name);
            }
            debug_assert!(
                violations.is_empty(),
                "pipeline '{}' has dependency order violations: {violations:?}",
                self.name
            );
            log::debug!("pipeline '{}' frozen with {} operators", self.name, self.operators.len());
        }
    }

    /// Run every operator on one event, in order, without short-circuiting.
    pub fn run(&self, event: &Event) -> PipelineOutcome {
        self.freeze();

        let mut ctx = EventContext::new(event);
        let mut accepted = true;
        let mut weight = 1.0;
        let mut contributions: Vec<(f64, BTreeMap<String, f64>)> = Vec::new();
        let mut decisions = Vec::with_capacity(self.operators.len());

        for op in &self.operators {
            let eval = op.evaluate(&mut ctx);

            let decision = if op.produces_decision() { eval.decision } else { None };
            ctx.record_decision(op.id(), decision);
            if op.produces_decision() && !op.ignore_decision() {
                accepted &= decision.unwrap_or(true);
            }
            decisions.push(decision);

            if op.produces_weight() {
                let w = eval.weight.unwrap_or(1.0);
                weight *= w;
                contributions.push((w, eval.variations));
            }
        }

        let names: BTreeSet<String> =
            contributions.iter().flat_map(|(_, vars)| vars.keys().cloned()).collect();
        let variations = names
            .into_iter()
            .map(|name| {
                let w = contributions
                    .iter()
                    .map(|(nominal, vars)| vars.get(&name).copied().unwrap_or(*nominal))
                    .product();
                (name, w)
            })
            .collect();

        PipelineOutcome { accepted, weight, variations, decisions, event: ctx.into_output() }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("operators", &self.operator_names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorCore;
    use crate::operator_common;
    use mx_core::Evaluation;

    #[derive(Debug)]
    struct Fixed {
        core: OperatorCore,
        decision: Option<bool>,
        weight: Option<f64>,
    }

    impl Fixed {
        fn new(name: &str, decision: Option<bool>, weight: Option<f64>) -> Self {
            Self { core: OperatorCore::new(name), decision, weight }
        }
    }

    impl Operator for Fixed {
        operator_common!("Fixed");

        fn produces_decision(&self) -> bool {
            self.decision.is_some()
        }

        fn produces_weight(&self) -> bool {
            self.weight.is_some()
        }

        fn evaluate(&self, _ctx: &mut EventContext<'_>) -> Evaluation {
            Evaluation { decision: self.decision, weight: self.weight, ..Evaluation::default() }
        }
    }

    #[test]
    fn names_and_positions() {
        let mut p = Pipeline::new("r");
        p.add_operator(Fixed::new("A", Some(true), None)).unwrap();
        p.insert_operator(Fixed::new("B", Some(true), None), 0).unwrap();
        p.insert_operator(Fixed::new("C", Some(true), None), 1).unwrap();
        assert_eq!(p.operator_names(), vec!["B", "C", "A"]);
        assert_eq!(p.position("A"), Some(2));
        assert!(p.contains("C"));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let mut p = Pipeline::new("r");
        p.add_operator(Fixed::new("A", Some(true), None)).unwrap();
        let err = p.insert_operator(Fixed::new("B", Some(true), None), 2).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 2, len: 1, .. }));
        // index == len appends
        p.insert_operator(Fixed::new("B", Some(true), None), 1).unwrap();
        assert_eq!(p.operator_names(), vec!["A", "B"]);
    }

    #[test]
    fn typed_lookup_mismatch() {
        struct Other {
            core: OperatorCore,
        }
        impl Operator for Other {
            operator_common!("Other");
            fn evaluate(&self, _ctx: &mut EventContext<'_>) -> Evaluation {
                Evaluation::decision(true)
            }
        }

        let mut p = Pipeline::new("r");
        p.add_operator(Other { core: OperatorCore::new("X") }).unwrap();
        let err = p.find_as::<Fixed>("X").unwrap_err();
        match err {
            Error::TypeMismatch { name, expected, actual } => {
                assert_eq!(name, "X");
                assert_eq!(expected, "Fixed");
                assert_eq!(actual, "Other");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(p.find_as::<Other>("X").is_ok());
    }

    #[test]
    fn frozen_after_run() {
        let mut p = Pipeline::new("r");
        p.add_operator(Fixed::new("A", Some(true), None)).unwrap();
        p.run(&Event::default());
        assert!(p.is_frozen());
        assert!(matches!(p.find_operator("A"), Err(Error::Frozen(_))));
        assert!(matches!(p.add_operator(Fixed::new("B", None, None)), Err(Error::Frozen(_))));
        // read access still works
        assert_eq!(p.get("A").unwrap().name(), "A");
        assert!(p.handle("A").is_ok());
    }

    #[test]
    fn non_deciding_stage_ignores_returned_decision() {
        let mut p = Pipeline::new("r");
        p.add_operator(Fixed::new("W", None, Some(3.0))).unwrap();
        let out = p.run(&Event::default());
        assert!(out.accepted);
        assert_eq!(out.decisions, vec![None]);
        assert_eq!(out.weight, 3.0);
    }

    #[test]
    fn handles_from_other_pipelines_are_violations() {
        struct Reader {
            core: OperatorCore,
            dep: OperatorHandle,
        }
        impl Operator for Reader {
            operator_common!("Reader");
            fn dependencies(&self) -> Vec<OperatorHandle> {
                vec![self.dep.clone()]
            }
            fn evaluate(&self, _ctx: &mut EventContext<'_>) -> Evaluation {
                Evaluation::decision(true)
            }
        }

        let mut other = Pipeline::new("other");
        other.add_operator(Fixed::new("P", Some(true), None)).unwrap();
        let foreign = other.handle("P").unwrap();

        let mut p = Pipeline::new("r");
        p.add_operator(Fixed::new("P", Some(true), None)).unwrap();
        let local = p.handle("P").unwrap();
        p.add_operator(Reader { core: OperatorCore::new("R1"), dep: local }).unwrap();
        assert!(p.dependency_violations().is_empty());

        p.add_operator(Reader { core: OperatorCore::new("R2"), dep: foreign }).unwrap();
        let v = p.dependency_violations();
        assert_eq!(v.len(), 1);
        assert!(v[0].contains("not in the pipeline"));
        assert_eq!(
            p.dependency_edges(),
            vec![("R1".to_string(), "P".to_string()), ("R2".to_string(), "P".to_string())]
        );
    }
}
