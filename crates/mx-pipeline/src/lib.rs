//! # mx-pipeline
//!
//! Operator pipelines for the MonoX skim.
//!
//! A [`Pipeline`] is an ordered, name-indexed chain of [`Operator`]s. Every
//! event runs through every operator; the pipeline combines their decisions
//! (AND over the non-ignorable ones) and weights (product, with named
//! variations). Pipelines can be reshaped by name until the first event and
//! are frozen afterwards.
//!
//! ## Example
//!
//! ```
//! use mx_pipeline::operators::{ConstantWeight, HighMet, MetSource};
//! use mx_pipeline::{Event, Pipeline};
//!
//! let mut p = Pipeline::new("monoph");
//! let mut cut = HighMet::new();
//! cut.set_met_source(MetSource::Input);
//! p.add_operator(cut).unwrap();
//! p.add_operator(ConstantWeight::new(0.01, "crosssection")).unwrap();
//!
//! p.find_as::<HighMet>("HighMet").unwrap().set_threshold(100.0);
//!
//! let out = p.run(&Event::default());
//! assert!(!out.accepted);
//! assert_eq!(out.weight, 0.01);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod event;
pub mod expr;
pub mod operator;
pub mod operators;
pub mod pipeline;
pub mod skimmer;

pub use context::{EventContext, MetShift, MetShifts, Product, ZCandidate};
pub use event::{Collection, Event, Kinematic, MetVector, SkimEvent};
pub use expr::{CompiledExpr, Observable};
pub use operator::{Operator, OperatorCore, OperatorHandle, OperatorId};
pub use pipeline::{OperatorSummary, Pipeline, PipelineOutcome};
pub use skimmer::{EventRecord, GoodLumiFilter, RegionOutput, SkimSummary, Skimmer};
