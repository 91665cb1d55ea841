//! Error types for retrieval orchestration

use thiserror::Error;

/// Raised only when no requested retrieval path produced anything usable
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Retrieval unavailable (semantic: {}, structured: {})",
        .semantic.as_deref().unwrap_or("not requested"),
        .structured.as_deref().unwrap_or("not requested"))]
    Unavailable {
        semantic: Option<String>,
        structured: Option<String>,
    },
}

impl RetrievalError {
    pub fn kind(&self) -> &'static str {
        "RetrievalUnavailable"
    }
}
