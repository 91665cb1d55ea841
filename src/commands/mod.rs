pub mod ask;
pub mod chat;
pub mod rebuild;
pub mod serve;
pub mod tools;

use anyhow::Context;
use campus_runtime::config::{LogFormat, LoggingConfig};
use campus_runtime::{CampusAssistant, Config};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Load configuration from `path` (with environment overrides) or from the
/// environment alone.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env()?;
            config
        }
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = installed {
        eprintln!("warning: tracing already initialised: {e}");
    }
}

/// Build the assistant and seed its index from the configured knowledge path.
pub async fn build_assistant(config: Config) -> anyhow::Result<Arc<CampusAssistant>> {
    let assistant = CampusAssistant::from_config(config)?;
    if let Some(count) = assistant.seed_index().await {
        tracing::info!(chunks = count, "Embedding index ready");
    }
    Ok(Arc::new(assistant))
}
