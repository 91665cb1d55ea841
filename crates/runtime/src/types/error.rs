//! Error type for the assistant façade

use thiserror::Error;

use crate::config::ConfigError;
use crate::rag::IndexError;
use crate::reasoning::InferenceError;
use crate::retrieval::RetrievalError;
use crate::routing::ClassifierError;
use crate::session::SessionError;
use crate::tools::ToolError;

/// Everything the assistant can fail with, one variant per component
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Generation error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl AssistantError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Stable error kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::InvalidRequest { .. } => "ValidationError",
            AssistantError::Configuration(e) => e.kind(),
            AssistantError::Classifier(e) => e.kind(),
            AssistantError::Index(e) => e.kind(),
            AssistantError::Tool(e) => e.kind(),
            AssistantError::Retrieval(e) => e.kind(),
            AssistantError::Inference(e) => e.kind(),
            AssistantError::Session(e) => e.kind(),
        }
    }

    /// Message without the component prefix
    pub fn message(&self) -> String {
        match self {
            AssistantError::InvalidRequest { reason } => reason.clone(),
            AssistantError::Configuration(e) => e.to_string(),
            AssistantError::Classifier(e) => e.to_string(),
            AssistantError::Index(e) => e.to_string(),
            AssistantError::Tool(e) => e.to_string(),
            AssistantError::Retrieval(e) => e.to_string(),
            AssistantError::Inference(e) => e.to_string(),
            AssistantError::Session(e) => e.to_string(),
        }
    }

    /// Structured detail for API error bodies
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AssistantError::Tool(ToolError::Validation { fields, .. }) if !fields.is_empty() => {
                Some(serde_json::json!({ "fields": fields }))
            }
            AssistantError::Tool(ToolError::NotFound { collection, id }) => {
                Some(serde_json::json!({ "collection": collection, "id": id }))
            }
            AssistantError::Retrieval(RetrievalError::Unavailable {
                semantic,
                structured,
            }) => Some(serde_json::json!({ "semantic": semantic, "structured": structured })),
            _ => None,
        }
    }
}

/// Result alias used by the façade
pub type AssistantResult<T> = Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_component_error() {
        let err: AssistantError = ToolError::validation("missing", vec!["name".into()]).into();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.details().unwrap()["fields"][0], "name");

        let err: AssistantError = SessionError::NotFound {
            session_id: "abc".into(),
        }
        .into();
        assert_eq!(err.kind(), "NotFoundError");
        assert_eq!(err.message(), "Session not found: abc");

        let err: AssistantError = IndexError::BuildFailed {
            reason: "empty".into(),
        }
        .into();
        assert_eq!(err.kind(), "IndexBuildError");
        assert!(err.to_string().starts_with("Index error:"));
    }
}
