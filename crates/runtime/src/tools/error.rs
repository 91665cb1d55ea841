//! Structured tool errors

use serde::Serialize;
use thiserror::Error;

/// Errors returned by the structured query tools.
///
/// Every variant maps to a stable [`ToolError::kind`] so callers can decide
/// whether to retry, narrow the query, or surface the failure.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "error_kind", rename_all = "snake_case")]
pub enum ToolError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        /// Offending field names
        fields: Vec<String>,
    },

    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Unknown collection: {collection}")]
    InvalidCollection { collection: String },

    #[error("Invalid aggregation: {reason}")]
    InvalidAggregation { reason: String },

    #[error("Record store error: {reason}")]
    Storage { reason: String },
}

impl ToolError {
    pub fn validation(message: impl Into<String>, fields: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields,
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Stable error kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation { .. } => "ValidationError",
            ToolError::NotFound { .. } => "NotFoundError",
            ToolError::InvalidCollection { .. } => "InvalidCollectionError",
            ToolError::InvalidAggregation { .. } => "InvalidAggregationError",
            ToolError::Storage { .. } => "StorageError",
        }
    }

    /// Only transient store failures are worth re-issuing unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Storage { .. })
    }
}

/// Result type for tool operations
pub type ToolResult<T> = Result<T, ToolError>;
