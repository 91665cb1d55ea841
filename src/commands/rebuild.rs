use campus_runtime::{CampusAssistant, Config};
use std::path::PathBuf;
use std::time::Instant;

pub async fn run(config: Config, knowledge: Option<PathBuf>) -> anyhow::Result<()> {
    let assistant = CampusAssistant::from_config(config)?;
    let started = Instant::now();
    let count = assistant.rebuild_index(knowledge.as_deref()).await?;
    let stats = assistant.index_stats();

    println!(
        "✓ Indexed {count} chunks from {} sources in {:.2}s",
        stats.total_sources,
        started.elapsed().as_secs_f64()
    );
    println!("  embedding dimension: {}", stats.embedding_dimension);
    Ok(())
}
