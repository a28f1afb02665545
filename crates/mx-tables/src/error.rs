//! Error types for side-table loading and lookup.

use thiserror::Error;

/// Side-table error type
#[derive(Error, Debug)]
pub enum TableError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Inconsistent binning or value arrays.
    #[error("table '{table}': {reason}")]
    Shape {
        /// Table name.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No table (or no unambiguous table) for the requested key.
    #[error("{0}")]
    Missing(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TableError>;

impl From<TableError> for mx_core::Error {
    fn from(e: TableError) -> Self {
        match e {
            TableError::Io(e) => mx_core::Error::Io(e),
            TableError::Json(e) => mx_core::Error::Json(e),
            TableError::Yaml(e) => mx_core::Error::Yaml(e),
            e @ TableError::Shape { .. } => mx_core::Error::Validation(e.to_string()),
            TableError::Missing(msg) => mx_core::Error::Configuration(msg),
        }
    }
}
