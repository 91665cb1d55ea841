//! Retrieval orchestration
//!
//! Executes a [`ClassificationDecision`](crate::routing::ClassificationDecision)
//! against the embedding index and the structured tools, and merges the
//! results into one provenance-tagged [`ContextBundle`].

pub mod bundle;
pub mod error;
pub mod orchestrator;

pub use bundle::{
    merge, BundleContent, BundleItem, ChunkExcerpt, ContextBundle, Origin, PathStatus, Provenance,
};
pub use error::RetrievalError;
pub use orchestrator::RetrievalOrchestrator;
