//! Semantic retrieval: chunking, embedding and the vector index
//!
//! Knowledge documents are split into overlapping chunks, embedded through an
//! [`EmbeddingService`] and searched by cosine similarity.

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod knowledge;
pub mod types;

pub use chunker::{TextChunk, TextChunker};
pub use embedding::{
    create_embedding_service, create_embedding_service_from_env, EmbeddingConfig,
    EmbeddingProvider, EmbeddingService, HashingEmbeddingService,
};
pub use index::EmbeddingIndex;
pub use knowledge::load_knowledge;
pub use types::*;
