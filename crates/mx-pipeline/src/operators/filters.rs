//! Event-level filters: triggers, MET noise filters, free-form cuts.

use mx_core::{Evaluation, Result};
use serde::{Deserialize, Serialize};

use crate::context::EventContext;
use crate::expr::CompiledExpr;
use crate::operator::{Operator, OperatorCore};
use crate::operator_common;

/// Passes events that fired any of a set of trigger paths.
///
/// The operator is named after its path expression; `"A_OR_B"` accepts
/// either `A` or `B`.
pub struct HltFilter {
    core: OperatorCore,
    paths: Vec<String>,
}

impl HltFilter {
    /// Filter on `paths`, split on `_OR_`.
    pub fn new(paths: &str) -> Self {
        Self {
            core: OperatorCore::new(paths),
            paths: paths.split("_OR_").map(str::to_string).collect(),
        }
    }

    /// Accepted trigger paths.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl Operator for HltFilter {
    operator_common!("HltFilter");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let fired = ctx.input.triggers.iter().any(|t| self.paths.iter().any(|p| p == t));
        Evaluation::decision(fired)
    }
}

/// Detector-noise filter flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetFilter {
    /// Beam halo.
    Halo,
    /// HCAL barrel/endcap noise.
    Hbhe,
    /// HCAL isolated noise.
    HbheIso,
    /// ECAL dead cells.
    EcalDeadCell,
    /// Bad endcap superclusters.
    BadSc,
    /// Good primary vertex.
    GoodVertices,
}

impl MetFilter {
    const ALL: [MetFilter; 6] = [
        MetFilter::Halo,
        MetFilter::Hbhe,
        MetFilter::HbheIso,
        MetFilter::EcalDeadCell,
        MetFilter::BadSc,
        MetFilter::GoodVertices,
    ];

    fn flag(self, ctx: &EventContext<'_>) -> bool {
        let f = &ctx.input.met_filters;
        match self {
            MetFilter::Halo => f.halo,
            MetFilter::Hbhe => f.hbhe,
            MetFilter::HbheIso => f.hbhe_iso,
            MetFilter::EcalDeadCell => f.ecal_dead_cell,
            MetFilter::BadSc => f.bad_sc,
            MetFilter::GoodVertices => f.good_vertices,
        }
    }
}

/// How a single MET filter enters the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Event must pass the filter.
    #[default]
    Require,
    /// Filter not applied.
    Ignore,
    /// Event must fail the filter (control samples of the noise source).
    Invert,
}

/// Applies the MET noise filters.
pub struct MetFilters {
    core: OperatorCore,
    modes: Vec<(MetFilter, FilterMode)>,
}

impl MetFilters {
    /// Every filter required.
    pub fn new() -> Self {
        Self {
            core: OperatorCore::new("MetFilters"),
            modes: MetFilter::ALL.iter().map(|&f| (f, FilterMode::Require)).collect(),
        }
    }

    /// Change how one filter is applied.
    pub fn set_filter(&mut self, filter: MetFilter, mode: FilterMode) {
        for (f, m) in &mut self.modes {
            if *f == filter {
                *m = mode;
            }
        }
    }

    /// Current mode of a filter.
    pub fn mode(&self, filter: MetFilter) -> FilterMode {
        self.modes.iter().find(|(f, _)| *f == filter).map_or(FilterMode::Require, |(_, m)| *m)
    }
}

impl Default for MetFilters {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for MetFilters {
    operator_common!("MetFilters");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        let pass = self.modes.iter().all(|&(filter, mode)| match mode {
            FilterMode::Require => filter.flag(ctx),
            FilterMode::Ignore => true,
            FilterMode::Invert => !filter.flag(ctx),
        });
        Evaluation::decision(pass)
    }
}

/// Cut on a selection expression over the input event.
pub struct ExprCut {
    core: OperatorCore,
    expr: CompiledExpr,
}

impl ExprCut {
    /// Compile `expression` into a cut called `name`.
    pub fn new(name: impl Into<String>, expression: &str) -> Result<Self> {
        Ok(Self { core: OperatorCore::new(name), expr: CompiledExpr::compile(expression)? })
    }

    /// The compiled expression.
    pub fn expression(&self) -> &CompiledExpr {
        &self.expr
    }
}

impl Operator for ExprCut {
    operator_common!("ExprCut");

    fn evaluate(&self, ctx: &mut EventContext<'_>) -> Evaluation {
        Evaluation::decision(self.expr.passes(ctx.input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Met, MetFilterFlags};

    fn decide(op: &dyn Operator, ev: &Event) -> bool {
        let mut ctx = EventContext::new(ev);
        op.evaluate(&mut ctx).decision.unwrap()
    }

    #[test]
    fn hlt_or_paths() {
        let f = HltFilter::new("HLT_IsoMu24_OR_HLT_IsoTkMu24");
        assert_eq!(f.name(), "HLT_IsoMu24_OR_HLT_IsoTkMu24");
        assert_eq!(f.paths(), &["HLT_IsoMu24".to_string(), "HLT_IsoTkMu24".to_string()]);

        let ev = Event { triggers: vec!["HLT_IsoTkMu24".into()], ..Event::default() };
        assert!(decide(&f, &ev));
        assert!(!decide(&HltFilter::new("HLT_Photon165_HE10"), &ev));
    }

    #[test]
    fn halo_modes() {
        let halo_event = Event {
            met_filters: MetFilterFlags { halo: false, ..MetFilterFlags::default() },
            ..Event::default()
        };
        let clean = Event::default();

        let mut f = MetFilters::new();
        assert!(decide(&f, &clean));
        assert!(!decide(&f, &halo_event));

        f.set_filter(MetFilter::Halo, FilterMode::Invert);
        assert!(!decide(&f, &clean));
        assert!(decide(&f, &halo_event));

        f.set_filter(MetFilter::Halo, FilterMode::Ignore);
        assert!(decide(&f, &clean));
        assert!(decide(&f, &halo_event));
        assert_eq!(f.mode(MetFilter::Halo), FilterMode::Ignore);
    }

    #[test]
    fn expression_cut() {
        let cut = ExprCut::new("MetCut", "met > 100").unwrap();
        let ev = Event { met: Met { pt: 150.0, ..Met::default() }, ..Event::default() };
        assert!(decide(&cut, &ev));
        assert!(!decide(&cut, &Event::default()));
        assert!(ExprCut::new("Bad", "met >").is_err());
    }
}
