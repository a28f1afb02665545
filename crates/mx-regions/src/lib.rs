//! # mx-regions
//!
//! Region assemblers for the MonoX skim.
//!
//! An assembler turns a sample (plus the shared side tables) into the
//! [`Pipeline`](mx_pipeline::Pipeline) of one analysis region. Base
//! assemblers lay down the fixed operator chains; derived assemblers reshape
//! a base chain by name; decorators wrap any assembler and add stages
//! uniformly. The [`RegionCatalog`] resolves all three by name for the skim
//! configuration.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use mx_core::SampleDescriptor;
//! use mx_regions::{AssemblyContext, RegionCatalog};
//! use mx_tables::TableStore;
//!
//! let ctx = AssemblyContext::new(
//!     SampleDescriptor::data("sph-16b", "SinglePhoton_Run2016B"),
//!     Arc::new(TableStore::new()),
//! );
//! let catalog = RegionCatalog::standard();
//! let p = catalog.build(&ctx, "haloLoose", "halo_loose", &[]).unwrap();
//! assert_eq!(p.operator_names()[0], "HLT_Photon165_HE10");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod base;
pub mod catalog;
pub mod config;
pub mod decorators;
pub mod derived;
pub mod skim_config;

pub use assembler::{Assembler, AssemblyContext, Decorator, PipelineSeed, assembler, decorate};
pub use catalog::RegionCatalog;
pub use config::AnalysisConfig;
pub use skim_config::{
    RegionConfig, RegionPlan, SampleConfig, SamplePlan, SkimConfig, SkippedRegion,
};
