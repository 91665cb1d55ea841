//! Configuration management for the campus assistant runtime
//!
//! Provides centralized configuration handling with validation, environment
//! variable overrides and TOML file loading.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::routing::ClassificationConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        "ConfigurationError"
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    pub classification: ClassificationConfig,
    pub generation: GenerationConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Retrieval orchestration limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks requested from the embedding index
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be used (inclusive)
    pub similarity_threshold: f32,
    /// Records requested per collection
    pub structured_limit: usize,
    /// Upper bound on merged context items
    pub max_bundle_items: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.25,
            structured_limit: 5,
            max_bundle_items: 8,
        }
    }
}

/// Embedding index and knowledge source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Target chunk length in characters
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Dimension of the offline hashing embedder
    pub embedding_dimension: usize,
    /// Knowledge file or directory used by rebuilds
    pub knowledge_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            embedding_dimension: 384,
            knowledge_path: PathBuf::from("knowledge"),
        }
    }
}

/// Response composition and text generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Upper bound on one text-generation call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Prior turns included in the prompt
    pub history_window: usize,
    /// Relevance at or above which a result counts as strong
    pub strong_relevance_threshold: f32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            history_window: 6,
            strong_relevance_threshold: 0.6,
            max_tokens: 512,
            temperature: 0.2,
        }
    }
}

/// Conversation session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are removed by cleanup
    #[serde(with = "humantime_serde")]
    pub inactivity_threshold: Duration,
    /// Oldest turns are dropped past this length
    pub max_turns: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::from_secs(2 * 60 * 60),
            max_turns: Some(200),
        }
    }
}

/// Record store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    JsonFiles,
}

/// Structured record storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding one JSON file per collection
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::JsonFiles,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, reason: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Override loaded values with any `CAMPUS_*` / `LOG_LEVEL` variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("CAMPUS_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = parse_env("CAMPUS_API_PORT", "Invalid port number")? {
            self.api.port = port;
        }

        if let Ok(path) = env::var("CAMPUS_KNOWLEDGE_PATH") {
            self.index.knowledge_path = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("CAMPUS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(secs) = parse_env::<u64>(
            "CAMPUS_GENERATION_TIMEOUT_SECS",
            "Expected a whole number of seconds",
        )? {
            self.generation.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>(
            "CAMPUS_SESSION_TIMEOUT_SECS",
            "Expected a whole number of seconds",
        )? {
            self.session.inactivity_threshold = Duration::from_secs(secs);
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", "Port cannot be 0"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Must be one of: {}", valid_levels.join(", ")),
            });
        }

        if self.index.chunk_size == 0 {
            return Err(invalid("index.chunk_size", "Chunk size must be > 0"));
        }
        if self.index.chunk_overlap >= self.index.chunk_size {
            return Err(invalid(
                "index.chunk_overlap",
                "Overlap must be smaller than the chunk size",
            ));
        }
        if self.index.embedding_dimension == 0 {
            return Err(invalid(
                "index.embedding_dimension",
                "Embedding dimension must be > 0",
            ));
        }

        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(invalid(
                "retrieval.similarity_threshold",
                "Must be between -1.0 and 1.0",
            ));
        }
        if self.retrieval.max_bundle_items == 0 {
            return Err(invalid(
                "retrieval.max_bundle_items",
                "Bundle must hold at least one item",
            ));
        }

        if self.generation.timeout.is_zero() {
            return Err(invalid("generation.timeout", "Timeout must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.generation.strong_relevance_threshold) {
            return Err(invalid(
                "generation.strong_relevance_threshold",
                "Must be between 0.0 and 1.0",
            ));
        }

        if self.session.inactivity_threshold.is_zero() {
            return Err(invalid(
                "session.inactivity_threshold",
                "Threshold must be > 0",
            ));
        }
        if self.session.max_turns == Some(0) {
            return Err(invalid("session.max_turns", "Must be > 0 when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.index.chunk_size, 500);
        assert_eq!(config.retrieval.max_bundle_items, 8);
        assert_eq!(config.generation.timeout, Duration::from_secs(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("CAMPUS_API_PORT", "9090");
        env::set_var("CAMPUS_API_HOST", "0.0.0.0");
        env::set_var("CAMPUS_SESSION_TIMEOUT_SECS", "60");
        env::set_var("LOG_LEVEL", "debug");

        let config = Config::from_env().unwrap();
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.session.inactivity_threshold, Duration::from_secs(60));
        assert_eq!(config.logging.level, "debug");

        env::remove_var("CAMPUS_API_PORT");
        env::remove_var("CAMPUS_API_HOST");
        env::remove_var("CAMPUS_SESSION_TIMEOUT_SECS");
        env::remove_var("LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_config_from_env_invalid_port() {
        env::set_var("CAMPUS_API_PORT", "invalid");

        let result = Config::from_env();
        assert!(result.is_err());
        if let Err(ConfigError::InvalidValue { key, reason }) = result {
            assert_eq!(key, "CAMPUS_API_PORT");
            assert!(reason.contains("Invalid port number"));
        }

        env::remove_var("CAMPUS_API_PORT");
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("campus.toml");
        std::fs::write(
            &path,
            r#"
[retrieval]
top_k = 3

[generation]
timeout = "5s"

[session]
inactivity_threshold = "30m"

[logging]
level = "warn"
format = "Json"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.max_bundle_items, 8);
        assert_eq!(config.generation.timeout, Duration::from_secs(5));
        assert_eq!(config.session.inactivity_threshold, Duration::from_secs(1800));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = Config::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::IoError { .. })));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[retrieval\ntop_k = ").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.api.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.chunk_overlap = config.index.chunk_size;
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "index.chunk_overlap"),
            other => panic!("unexpected result {other:?}"),
        }

        let mut config = Config::default();
        config.generation.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
