//! Error types for idlinker
//!
//! Centralized error handling using thiserror. Per-candidate lookup failures are
//! not errors at this level; they travel as `ResolutionOutcome::Error` values.

use thiserror::Error;

/// All fatal error types that can occur in idlinker
#[derive(Debug, Error)]
pub enum LinkerError {
    /// Invalid run configuration, surfaced before any dispatch begins
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Record store could not be loaded or is inconsistent
    #[error("Store error: {0}")]
    Store(String),

    /// Record key not present in the store
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Resolver could not be constructed
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for idlinker operations
pub type Result<T> = std::result::Result<T, LinkerError>;
