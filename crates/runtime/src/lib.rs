//! Campus Assistant Runtime
//!
//! Query routing and retrieval for the academic-portal chatbot: classifies
//! each question, pulls context from the policy embedding index and the
//! structured record tools, composes a cited reply, and keeps per-session
//! conversation history.

pub mod assistant;
pub mod config;
pub mod rag;
pub mod reasoning;
pub mod retrieval;
pub mod routing;
pub mod session;
pub mod text;
pub mod tools;
pub mod types;

#[cfg(feature = "http-api")]
pub mod api;

// Re-export commonly used types
pub use assistant::{CampusAssistant, ChatReply, ChatRequest, MAX_MESSAGE_CHARS};
pub use config::{Config, ConfigError};
pub use rag::{EmbeddingIndex, EmbeddingService, IndexError, IndexStats};
pub use reasoning::{ComposedReply, Confidence, InferenceProvider, ResponseComposer};
pub use retrieval::{ContextBundle, RetrievalError, RetrievalOrchestrator};
pub use routing::{ClassificationDecision, QueryClassifier, QueryRoute};
pub use session::{ExportFormat, SessionStore, Turn, TurnRole};
pub use tools::{RecordStore, StructuredToolSet, ToolCall, ToolError, ToolOutput};
pub use types::*;
