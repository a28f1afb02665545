//! The operator contract.
//!
//! An operator is one named stage of a [`Pipeline`](crate::Pipeline). It may
//! gate events (decision), weight them (nominal weight plus named
//! variations), compute products for later stages, or any combination.
//! Typed parameters live on the concrete operator struct and are changed
//! through its setters before the pipeline starts processing.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use mx_core::Evaluation;

use crate::context::EventContext;

/// Process-unique operator identity, assigned when an operator joins a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(u64);

impl OperatorId {
    /// Identity of an operator that has not joined a pipeline yet.
    pub const UNASSIGNED: OperatorId = OperatorId(0);

    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        OperatorId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reference to an operator that is already part of a pipeline.
///
/// Only [`Pipeline::handle`](crate::Pipeline::handle) hands these out, so
/// holding one means the producer was present when the consumer was wired.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorHandle {
    id: OperatorId,
    name: String,
}

impl OperatorHandle {
    pub(crate) fn new(id: OperatorId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// Identity of the referenced operator.
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// Name of the referenced operator.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// State shared by every operator: name, identity and the ignore flag.
#[derive(Debug, Clone)]
pub struct OperatorCore {
    name: String,
    id: OperatorId,
    ignore_decision: bool,
}

impl OperatorCore {
    /// Fresh core for an operator called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), id: OperatorId::UNASSIGNED, ignore_decision: false }
    }

    /// Operator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assigned identity.
    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: OperatorId) {
        self.id = id;
    }
}

/// One stage of a pipeline.
///
/// Implementors embed an [`OperatorCore`] and usually get the accessor
/// boilerplate from [`operator_common!`](crate::operator_common).
pub trait Operator: Any + Send + Sync {
    /// Shared state.
    fn core(&self) -> &OperatorCore;

    /// Shared state, mutable.
    fn core_mut(&mut self) -> &mut OperatorCore;

    /// Short type name used in diagnostics and plans.
    fn kind(&self) -> &'static str;

    /// Whether `evaluate` returns a decision.
    fn produces_decision(&self) -> bool {
        true
    }

    /// Whether `evaluate` returns a weight.
    fn produces_weight(&self) -> bool {
        false
    }

    /// Operators whose per-event products this operator reads.
    fn dependencies(&self) -> Vec<OperatorHandle> {
        Vec::new()
    }

    /// Names of the weight variations this operator reports.
    fn variation_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Process one event.
    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation;

    /// Upcast for typed lookup.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed mutation.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Operator name, unique within its pipeline.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Identity assigned by the owning pipeline.
    fn id(&self) -> OperatorId {
        self.core().id()
    }

    /// Whether the decision is excluded from the pipeline-level AND.
    fn ignore_decision(&self) -> bool {
        self.core().ignore_decision
    }

    /// Exclude (or re-include) the decision from the pipeline-level AND.
    fn set_ignore_decision(&mut self, ignore: bool) {
        self.core_mut().ignore_decision = ignore;
    }
}

/// Implements the accessor methods of [`Operator`] for a struct with a
/// `core: OperatorCore` field.
#[macro_export]
macro_rules! operator_common {
    ($kind:literal) => {
        fn core(&self) -> &$crate::OperatorCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::OperatorCore {
            &mut self.core
        }

        fn kind(&self) -> &'static str {
            $kind
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}
