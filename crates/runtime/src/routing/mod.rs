//! Deterministic query routing
//!
//! Decides per user message whether the semantic index, the structured
//! record tools, or both should be consulted.

pub mod classifier;
pub mod config;
pub mod decision;
pub mod error;

pub use classifier::QueryClassifier;
pub use config::ClassificationConfig;
pub use decision::{ClassificationDecision, QueryRoute};
pub use error::ClassifierError;
