//! Error types for the routing module

use thiserror::Error;

/// Errors raised while building a query classifier
#[derive(Debug, Clone, Error)]
pub enum ClassifierError {
    #[error("Invalid {table} pattern '{pattern}': {reason}")]
    InvalidPattern {
        table: String,
        pattern: String,
        reason: String,
    },

    #[error("Invalid alias for collection {collection}: {reason}")]
    InvalidAlias { collection: String, reason: String },
}

impl ClassifierError {
    pub fn kind(&self) -> &'static str {
        "ConfigurationError"
    }
}
