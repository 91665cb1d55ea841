use campus_runtime::api::{HttpApiConfig, HttpApiServer};
use campus_runtime::Config;
use std::time::Duration;

use super::build_assistant;

pub async fn run(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.api.host = host;
    }
    if let Some(port) = port {
        config.api.port = port;
    }

    println!("✓ Starting Campus Assist...");
    let http_config = HttpApiConfig::from(&config.api);
    let sweep_every = config.session.inactivity_threshold.max(Duration::from_secs(60));
    let assistant = build_assistant(config).await?;

    // Periodic sweep of idle sessions
    let sweeper = assistant.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = sweeper.cleanup_sessions();
            if removed > 0 {
                tracing::info!(removed, "Expired idle sessions");
            }
        }
    });

    println!(
        "✓ Serving on http://{}:{}/api/v1",
        http_config.bind_address, http_config.port
    );
    HttpApiServer::new(http_config, assistant).start().await?;
    Ok(())
}
