//! # mx-core
//!
//! Core types and traits for the MonoX skim framework.
//!
//! This crate is dependency-light and shared by the table store, the
//! operator pipeline and the region catalogue.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{Lookup, VariationLookup};
pub use types::{Evaluation, SampleDescriptor};
