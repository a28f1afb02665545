//! Error types for MonoX

use thiserror::Error;

/// MonoX error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Missing or ambiguous side-table entry (e.g. no pileup profile for a sample).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operator with this name already exists in the pipeline.
    #[error("operator '{name}' already exists in pipeline '{pipeline}'")]
    DuplicateName {
        /// Pipeline name.
        pipeline: String,
        /// Offending operator name.
        name: String,
    },

    /// No operator with this name exists in the pipeline.
    #[error("operator '{name}' not found in pipeline '{pipeline}'")]
    NotFound {
        /// Pipeline name.
        pipeline: String,
        /// Requested operator name.
        name: String,
    },

    /// Insertion index beyond the current pipeline length.
    #[error("insertion index {index} out of range for pipeline '{pipeline}' (len {len})")]
    IndexOutOfRange {
        /// Pipeline name.
        pipeline: String,
        /// Requested index.
        index: usize,
        /// Pipeline length at the time of the call.
        len: usize,
    },

    /// The operator exists but is not of the requested concrete type.
    #[error("operator '{name}' is a {actual}, not a {expected}")]
    TypeMismatch {
        /// Operator name.
        name: String,
        /// Requested type.
        expected: &'static str,
        /// Actual operator kind.
        actual: &'static str,
    },

    /// Mutation attempted after the pipeline started processing events.
    #[error("pipeline '{0}' is frozen: it has already processed events")]
    Frozen(String),

    /// Preselection expression error
    #[error("Expression error: {0}")]
    Expression(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
