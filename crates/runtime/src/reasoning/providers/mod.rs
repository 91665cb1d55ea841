//! Inference provider implementations

pub mod cloud;
pub mod extractive;

pub use cloud::{CloudInferenceProvider, LlmProvider};
pub use extractive::ExtractiveInferenceProvider;

use crate::reasoning::inference::InferenceProvider;
use std::sync::Arc;

/// Hosted provider when an API key is configured, extractive otherwise.
pub fn inference_provider_from_env() -> Arc<dyn InferenceProvider> {
    match CloudInferenceProvider::from_env() {
        Some(provider) => Arc::new(provider),
        None => Arc::new(ExtractiveInferenceProvider::default()),
    }
}
