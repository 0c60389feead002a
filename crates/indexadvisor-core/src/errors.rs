//! Error types for the index advisor engine

use thiserror::Error;

/// Result type alias for index advisor operations
pub type Result<T> = std::result::Result<T, IndexAdvisorError>;

/// Errors that can occur while configuring or running the advisor
#[derive(Debug, Error)]
pub enum IndexAdvisorError {
    /// A configuration map contained a key the advisor does not recognize
    #[error("unknown configuration key: {0}")]
    ConfigUnknownKey(String),

    /// A configuration value was present but out of range or the wrong type
    #[error("invalid configuration value for `{key}`: {message}")]
    ConfigInvalid { key: String, message: String },

    /// `calculate_cost` (or any other evaluator call) was made after `complete()`
    #[error("cost evaluator has already completed and cannot be reused")]
    EvaluatorSealed,

    /// The database connector (what-if simulator, real connection, ...) failed
    #[error("database connector failed: {0}")]
    ConnectorFailure(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// An invariant the evaluator or algorithm relies on was violated
    #[error("internal invariant violated: {0}")]
    Internal(String),
}
