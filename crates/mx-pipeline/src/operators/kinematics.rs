//! Two-object kinematics on the output collections.

use mx_core::Evaluation;

use crate::context::EventContext;
use crate::event::{Candidate, Collection, invariant_mass};
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

/// Leading object of `c1` and the leading remaining object of `c2`.
fn leading_pair(
    ctx: &EventContext<'_>,
    c1: Collection,
    c2: Collection,
) -> Option<(Candidate, Candidate)> {
    let first = ctx.output.candidates(c1);
    if c1 == c2 {
        return match first.as_slice() {
            [a, b, ..] => Some((*a, *b)),
            _ => None,
        };
    }
    let second = ctx.output.candidates(c2);
    Some((*first.first()?, *second.first()?))
}

/// Invariant-mass window on the leading pair of two output collections.
///
/// Named `<prefix>Mass` so several windows can live in one pipeline.
pub struct Mass {
    core: OperatorCore,
    prefix: String,
    min: f64,
    max: f64,
    collections: (Collection, Collection),
}

impl Mass {
    /// Unbounded window on the two leading photons.
    pub fn new(prefix: &str) -> Self {
        Self {
            core: OperatorCore::new(format!("{prefix}Mass")),
            prefix: prefix.to_string(),
            min: 0.0,
            max: f64::INFINITY,
            collections: (Collection::Photons, Collection::Photons),
        }
    }

    /// Lower edge (GeV).
    pub fn set_min(&mut self, min: f64) {
        self.min = min;
    }

    /// Upper edge (GeV).
    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }

    /// Collection of the first object.
    pub fn set_collection1(&mut self, collection: Collection) {
        self.collections.0 = collection;
    }

    /// Collection of the second object.
    pub fn set_collection2(&mut self, collection: Collection) {
        self.collections.1 = collection;
    }

    /// Window edges.
    pub fn window(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

impl Operator for Mass {
    operator_common!("Mass");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some((a, b)) = leading_pair(ctx, self.collections.0, self.collections.1) else {
            return Evaluation::decision(false);
        };
        let mass = invariant_mass(&a, &b);
        ctx.set_observable(format!("{}Mass", self.prefix), mass);
        Evaluation::decision(mass > self.min && mass < self.max)
    }
}

/// Requires the leading pair of two output collections to carry opposite
/// charges. Named `<prefix>Sign`.
pub struct OppositeSign {
    core: OperatorCore,
    prefix: String,
    collections: (Collection, Collection),
}

impl OppositeSign {
    /// Opposite charges on the two leading electrons.
    pub fn new(prefix: &str) -> Self {
        Self {
            core: OperatorCore::new(format!("{prefix}Sign")),
            prefix: prefix.to_string(),
            collections: (Collection::Electrons, Collection::Electrons),
        }
    }

    /// Collection of the first object.
    pub fn set_collection1(&mut self, collection: Collection) {
        self.collections.0 = collection;
    }

    /// Collection of the second object.
    pub fn set_collection2(&mut self, collection: Collection) {
        self.collections.1 = collection;
    }
}

impl Operator for OppositeSign {
    operator_common!("OppositeSign");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let Some((a, b)) = leading_pair(ctx, self.collections.0, self.collections.1) else {
            return Evaluation::decision(false);
        };
        let opposite = a.charge * b.charge < 0;
        ctx.set_observable(format!("{}OppSign", self.prefix), if opposite { 1.0 } else { 0.0 });
        Evaluation::decision(opposite)
    }
}
