//! # mx-tables
//!
//! Binned correction tables and the side-table store for MonoX.
//!
//! Tables are loaded once (JSON or YAML), validated, and shared read-only
//! between every pipeline built for a job.
//!
//! ## Example
//!
//! ```no_run
//! use mx_core::Lookup;
//! use mx_tables::TableStore;
//!
//! let store = TableStore::from_path("tables.json".as_ref()).unwrap();
//! let (era, profile) = store.pileup_for("ZNuNuGJets_RunIISummer16MiniAODv2").unwrap();
//! println!("{era}: w(npu=25) = {}", profile.lookup(&[25.0]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binned;
pub mod error;
pub mod store;

pub use binned::{BinnedTable, CorrectionTable};
pub use error::{Result, TableError};
pub use store::TableStore;
