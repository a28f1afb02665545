//! Per-event execution context threaded through every operator call.

use std::collections::HashMap;

use crate::event::{Event, MetVector, SkimEvent};
use crate::operator::{OperatorHandle, OperatorId};

/// Energy-scale shift of a MET computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetShift {
    /// Jet energy correction up.
    JecUp,
    /// Jet energy correction down.
    JecDown,
    /// Photon (ECAL) energy scale up.
    GecUp,
    /// Photon (ECAL) energy scale down.
    GecDown,
    /// Unclustered energy up.
    UnclUp,
    /// Unclustered energy down.
    UnclDown,
}

impl MetShift {
    /// All shifts in output order.
    pub const ALL: [MetShift; 6] = [
        MetShift::JecUp,
        MetShift::JecDown,
        MetShift::GecUp,
        MetShift::GecDown,
        MetShift::UnclUp,
        MetShift::UnclDown,
    ];

    /// Branch suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            MetShift::JecUp => "JECUp",
            MetShift::JecDown => "JECDown",
            MetShift::GecUp => "GECUp",
            MetShift::GecDown => "GECDown",
            MetShift::UnclUp => "UnclUp",
            MetShift::UnclDown => "UnclDown",
        }
    }
}

/// Shifted MET vectors computed for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetShifts {
    shifts: Vec<(MetShift, MetVector)>,
}

impl MetShifts {
    /// Record a shifted vector.
    pub fn insert(&mut self, shift: MetShift, met: MetVector) {
        match self.shifts.iter_mut().find(|(s, _)| *s == shift) {
            Some(slot) => slot.1 = met,
            None => self.shifts.push((shift, met)),
        }
    }

    /// Shifted vector, if computed.
    pub fn get(&self, shift: MetShift) -> Option<MetVector> {
        self.shifts.iter().find(|(s, _)| *s == shift).map(|(_, m)| *m)
    }

    /// All computed shifts.
    pub fn iter(&self) -> impl Iterator<Item = (MetShift, MetVector)> + '_ {
        self.shifts.iter().copied()
    }
}

/// Dilepton (tag-and-probe) candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZCandidate {
    /// Pair transverse momentum.
    pub pt: f64,
    /// Pair pseudorapidity.
    pub eta: f64,
    /// Pair azimuth.
    pub phi: f64,
    /// Pair invariant mass.
    pub mass: f64,
}

impl crate::event::Kinematic for ZCandidate {
    fn pt(&self) -> f64 {
        self.pt
    }

    fn eta(&self) -> f64 {
        self.eta
    }

    fn phi(&self) -> f64 {
        self.phi
    }
}

/// A per-event product published by one operator for its consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum Product {
    /// Shifted MET vectors.
    MetShifts(MetShifts),
    /// Reconstructed dilepton pair.
    ZCandidate(ZCandidate),
}

/// Mutable state of one event while it travels down a pipeline.
#[derive(Debug)]
pub struct EventContext<'a> {
    /// The reconstructed input event (read-only).
    pub input: &'a Event,
    /// The output event being filled.
    pub output: SkimEvent,
    products: HashMap<OperatorId, Product>,
    decisions: HashMap<OperatorId, Option<bool>>,
}

impl<'a> EventContext<'a> {
    /// Fresh context for `input` with an empty output event.
    pub fn new(input: &'a Event) -> Self {
        Self {
            input,
            output: SkimEvent::default(),
            products: HashMap::new(),
            decisions: HashMap::new(),
        }
    }

    /// Publish a product under the producing operator's identity.
    pub fn publish(&mut self, producer: OperatorId, product: Product) {
        self.products.insert(producer, product);
    }

    /// Shifted MET vectors published by `producer` this event.
    pub fn met_shifts(&self, producer: &OperatorHandle) -> Option<&MetShifts> {
        match self.products.get(&producer.id()) {
            Some(Product::MetShifts(m)) => Some(m),
            _ => None,
        }
    }

    /// Dilepton candidate published by `producer` this event.
    pub fn z_candidate(&self, producer: &OperatorHandle) -> Option<&ZCandidate> {
        match self.products.get(&producer.id()) {
            Some(Product::ZCandidate(z)) => Some(z),
            _ => None,
        }
    }

    /// Decision recorded by an operator that already ran this event.
    ///
    /// `None` if the operator has not run yet or produces no decision.
    /// Ignorable decisions are recorded too, so this is how a later stage
    /// consumes them.
    pub fn decision_of(&self, op: &OperatorHandle) -> Option<bool> {
        self.decisions.get(&op.id()).copied().flatten()
    }

    pub(crate) fn record_decision(&mut self, op: OperatorId, decision: Option<bool>) {
        self.decisions.insert(op, decision);
    }

    /// Set a named output quantity.
    pub fn set_observable(&mut self, key: impl Into<String>, value: f64) {
        self.output.observables.insert(key.into(), value);
    }

    /// Consume the context, keeping the output event.
    pub fn into_output(self) -> SkimEvent {
        self.output
    }
}
