//! Embedding service providers for generating vector embeddings
//!
//! Supports Ollama (local) and OpenAI (cloud) embedding providers, with
//! automatic provider detection from environment variables. When neither is
//! configured the offline [`HashingEmbeddingService`] is used.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::types::IndexError;
use crate::text::tokenize;

/// Produces embedding vectors for text
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for text content
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    /// Generate embeddings for multiple texts in batch
    async fn generate_batch_embeddings(&self, texts: Vec<&str>)
        -> Result<Vec<Vec<f32>>, IndexError>;

    /// Get the dimension of embeddings produced by this service
    fn embedding_dimension(&self) -> usize;
}

/// Embedding provider selection
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingProvider {
    Ollama,
    OpenAi,
}

/// Configuration for a remote embedding service provider
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub timeout_seconds: u64,
}

impl EmbeddingConfig {
    /// Resolve embedding configuration from environment variables.
    ///
    /// Returns `None` if no provider can be determined, which signals the
    /// caller to fall back to the hashing service.
    ///
    /// Resolution order:
    /// 1. API key: `EMBEDDING_API_KEY` → `OPENAI_API_KEY` → None
    /// 2. Provider: `EMBEDDING_PROVIDER` explicit, or auto-detect from URL/key
    /// 3. Per-provider defaults for model, URL, and dimension
    /// 4. Overrides: `EMBEDDING_MODEL`, `EMBEDDING_API_BASE_URL`, `VECTOR_DIMENSION`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty());

        let base_url = std::env::var("EMBEDDING_API_BASE_URL")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_BASE_URL").ok())
            .filter(|u| !u.is_empty());

        let explicit_provider = std::env::var("EMBEDDING_PROVIDER")
            .ok()
            .filter(|p| !p.is_empty());

        let provider = if let Some(ref p) = explicit_provider {
            match p.to_lowercase().as_str() {
                "ollama" => EmbeddingProvider::Ollama,
                "openai" => EmbeddingProvider::OpenAi,
                _ => return None,
            }
        } else if let Some(ref url) = base_url {
            if url.contains("localhost") || url.contains("127.0.0.1") {
                EmbeddingProvider::Ollama
            } else if api_key.is_some() {
                EmbeddingProvider::OpenAi
            } else {
                return None;
            }
        } else if api_key.is_some() {
            EmbeddingProvider::OpenAi
        } else {
            return None;
        };

        let (default_model, default_url, default_dim) = match provider {
            EmbeddingProvider::Ollama => (
                "nomic-embed-text".to_string(),
                "http://localhost:11434".to_string(),
                768,
            ),
            EmbeddingProvider::OpenAi => (
                "text-embedding-3-small".to_string(),
                "https://api.openai.com/v1".to_string(),
                1536,
            ),
        };

        let model = std::env::var("EMBEDDING_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(default_model);

        let dimension = std::env::var("VECTOR_DIMENSION")
            .ok()
            .and_then(|d| d.parse::<usize>().ok())
            .unwrap_or(default_dim);

        Some(Self {
            provider,
            model,
            base_url: base_url.unwrap_or(default_url),
            api_key,
            dimension,
            timeout_seconds: 30,
        })
    }
}

/// Deterministic, offline embedding based on feature hashing.
///
/// Each token is hashed (FNV-1a) into one of `dimension` buckets with a
/// hash-derived sign, and the resulting vector is L2-normalised. Texts that
/// share vocabulary land close together under cosine similarity.
pub struct HashingEmbeddingService {
    dimension: usize,
}

impl HashingEmbeddingService {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash = Self::fnv1a(&token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbeddingService {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        Ok(self.embed(text))
    }

    async fn generate_batch_embeddings(
        &self,
        texts: Vec<&str>,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.into_iter().map(|text| self.embed(text)).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client, IndexError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| IndexError::EmbeddingUnavailable {
            reason: format!("Failed to create HTTP client: {e}"),
        })
}

fn parse_vector(value: &serde_json::Value, provider: &str) -> Result<Vec<f32>, IndexError> {
    value
        .as_array()
        .ok_or_else(|| IndexError::EmbeddingUnavailable {
            reason: format!("Invalid embedding array in {provider} response"),
        })?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| IndexError::EmbeddingUnavailable {
                    reason: "Invalid float in embedding".to_string(),
                })
        })
        .collect()
}

async fn post_json(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<serde_json::Value, IndexError> {
    let resp = request
        .send()
        .await
        .map_err(|e| IndexError::EmbeddingUnavailable {
            reason: format!("{provider} request failed: {e}"),
        })?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        return Err(IndexError::EmbeddingUnavailable {
            reason: format!("{provider} returned {status}: {body_text}"),
        });
    }

    resp.json()
        .await
        .map_err(|e| IndexError::EmbeddingUnavailable {
            reason: format!("Failed to parse {provider} response: {e}"),
        })
}

/// Ollama embedding service using the native `/api/embed` endpoint
pub struct OllamaEmbeddingService {
    client: reqwest::Client,
    model: String,
    base_url: String,
    dimension: usize,
}

impl OllamaEmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, IndexError> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbeddingService {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut results = self.generate_batch_embeddings(vec![text]).await?;
        results.pop().ok_or_else(|| IndexError::EmbeddingUnavailable {
            reason: "Empty response from Ollama".to_string(),
        })
    }

    async fn generate_batch_embeddings(
        &self,
        texts: Vec<&str>,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body);
        let json = post_json(request, "Ollama").await?;

        json.get("embeddings")
            .and_then(|v| v.as_array())
            .ok_or_else(|| IndexError::EmbeddingUnavailable {
                reason: "Missing 'embeddings' field in Ollama response".to_string(),
            })?
            .iter()
            .map(|emb| parse_vector(emb, "Ollama"))
            .collect()
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }
}

/// OpenAI-compatible embedding service
pub struct OpenAiEmbeddingService {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    dimension: usize,
}

impl OpenAiEmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, IndexError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| IndexError::EmbeddingUnavailable {
                reason: "OpenAI embedding service requires an API key".to_string(),
            })?;

        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingService {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut results = self.generate_batch_embeddings(vec![text]).await?;
        results.pop().ok_or_else(|| IndexError::EmbeddingUnavailable {
            reason: "Empty response from OpenAI".to_string(),
        })
    }

    async fn generate_batch_embeddings(
        &self,
        texts: Vec<&str>,
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = post_json(request, "OpenAI").await?;

        if let Some(usage) = json.get("usage") {
            tracing::debug!(
                prompt_tokens = usage.get("prompt_tokens").and_then(|v| v.as_u64()),
                total_tokens = usage.get("total_tokens").and_then(|v| v.as_u64()),
                "OpenAI embedding token usage"
            );
        }

        let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
            IndexError::EmbeddingUnavailable {
                reason: "Missing 'data' field in OpenAI response".to_string(),
            }
        })?;

        // Responses may arrive out of order
        let mut indexed = data
            .iter()
            .map(|item| {
                let index = item.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                let embedding = item.get("embedding").ok_or_else(|| {
                    IndexError::EmbeddingUnavailable {
                        reason: "Missing 'embedding' in OpenAI response item".to_string(),
                    }
                })?;
                Ok((index, parse_vector(embedding, "OpenAI")?))
            })
            .collect::<Result<Vec<(usize, Vec<f32>)>, IndexError>>()?;
        indexed.sort_by_key(|(i, _)| *i);

        Ok(indexed.into_iter().map(|(_, emb)| emb).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedding service from a resolved config.
pub fn create_embedding_service(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingService>, IndexError> {
    match config.provider {
        EmbeddingProvider::Ollama => {
            tracing::info!(
                model = %config.model,
                url = %config.base_url,
                dimension = config.dimension,
                "Using Ollama embedding service"
            );
            Ok(Arc::new(OllamaEmbeddingService::new(config)?))
        }
        EmbeddingProvider::OpenAi => {
            tracing::info!(
                model = %config.model,
                url = %config.base_url,
                dimension = config.dimension,
                "Using OpenAI embedding service"
            );
            Ok(Arc::new(OpenAiEmbeddingService::new(config)?))
        }
    }
}

/// Create an embedding service from environment variables, falling back to
/// [`HashingEmbeddingService`] when no provider is configured.
pub fn create_embedding_service_from_env(
    fallback_dimension: usize,
) -> Result<Arc<dyn EmbeddingService>, IndexError> {
    match EmbeddingConfig::from_env() {
        Some(config) => create_embedding_service(&config),
        None => {
            tracing::debug!(
                dimension = fallback_dimension,
                "No embedding provider configured, using hashing embedding service"
            );
            Ok(Arc::new(HashingEmbeddingService::new(fallback_dimension)))
        }
    }
}

/// Cosine similarity between two vectors; 0.0 when either is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in &[
            "EMBEDDING_PROVIDER",
            "EMBEDDING_API_KEY",
            "OPENAI_API_KEY",
            "EMBEDDING_API_BASE_URL",
            "OPENAI_API_BASE_URL",
            "EMBEDDING_MODEL",
            "VECTOR_DIMENSION",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_embedding_config_defaults_ollama() {
        clear_env();
        std::env::set_var("EMBEDDING_PROVIDER", "ollama");

        let config = EmbeddingConfig::from_env().expect("should resolve");
        assert_eq!(config.provider, EmbeddingProvider::Ollama);
        assert_eq!(config.model, "nomic-embed-text");
        assert_eq!(config.dimension, 768);
        assert!(config.api_key.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_embedding_config_auto_detect_openai_from_key() {
        clear_env();
        std::env::set_var("OPENAI_API_KEY", "sk-auto");

        let config = EmbeddingConfig::from_env().expect("should resolve");
        assert_eq!(config.provider, EmbeddingProvider::OpenAi);
        assert_eq!(config.api_key.as_deref(), Some("sk-auto"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_embedding_config_none_when_no_provider() {
        clear_env();
        assert!(EmbeddingConfig::from_env().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_hashing_fallback_generates_normalized_embeddings() {
        clear_env();

        let svc = create_embedding_service_from_env(128).expect("should return hashing service");
        assert_eq!(svc.embedding_dimension(), 128);
        let emb = svc.generate_embedding("attendance policy").await.unwrap();
        assert_eq!(emb.len(), 128);

        let mag: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_hashing_embeddings_rank_shared_vocabulary_higher() {
        let svc = HashingEmbeddingService::new(256);
        let query = svc.generate_embedding("sick leave policy").await.unwrap();
        let related = svc
            .generate_embedding("The sick leave policy allows ten days per semester")
            .await
            .unwrap();
        let unrelated = svc
            .generate_embedding("Library opening hours during exams")
            .await
            .unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
