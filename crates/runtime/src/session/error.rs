use thiserror::Error;

/// Session store errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Invalid session id '{session_id}': {reason}")]
    InvalidSessionId { session_id: String, reason: String },

    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Unsupported export format '{format}', expected plain or jsonl")]
    InvalidFormat { format: String },

    #[error("Session export failed: {reason}")]
    Export { reason: String },
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InvalidSessionId { .. } | SessionError::InvalidFormat { .. } => {
                "ValidationError"
            }
            SessionError::NotFound { .. } => "NotFoundError",
            SessionError::Export { .. } => "StorageError",
        }
    }
}
