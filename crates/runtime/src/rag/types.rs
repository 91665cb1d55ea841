//! Embedding index data structures and errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Errors that can occur while building or querying the embedding index
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    #[error("Invalid chunking parameters: {reason}")]
    InvalidChunking { reason: String },

    #[error("Embedding service unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("Index build failed: {reason}")]
    BuildFailed { reason: String },
}

impl IndexError {
    /// Stable error kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::InvalidChunking { .. } => "ValidationError",
            IndexError::EmbeddingUnavailable { .. } => "EmbeddingUnavailable",
            IndexError::BuildFailed { .. } => "IndexBuildError",
        }
    }
}

/// A source document handed to the index for chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Stable identifier of the parent document (file path, URL, ...)
    pub source: String,
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_category() -> String {
    "general".to_string()
}

impl DocumentInput {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            category: category.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A stored, embedded slice of a source document.
///
/// Chunks are never mutated after indexing; re-indexing a source replaces
/// all of its chunks at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `<source>#<chunk_index>`
    pub id: String,
    pub source: String,
    pub title: String,
    pub category: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, String>,
    pub indexed_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn chunk_id(source: &str, chunk_index: usize) -> String {
        format!("{source}#{chunk_index}")
    }
}

/// A chunk returned from similarity search together with its score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// Cosine similarity between the query and the chunk embedding
    pub similarity: f32,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_sources: usize,
    pub embedding_dimension: usize,
    pub last_rebuild: Option<DateTime<Utc>>,
}
