use campus_runtime::session::{generate_session_id, ExportFormat};
use campus_runtime::{ChatRequest, Config};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ask::print_reply;
use super::build_assistant;

const HELP: &str = "commands: /clear, /history, /export [plain|jsonl], /quit";

pub async fn run(config: Config, session: Option<String>) -> anyhow::Result<()> {
    let assistant = build_assistant(config).await?;
    let session_id = session.unwrap_or_else(generate_session_id);
    println!("✓ Session {session_id}");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            Some("/quit") | Some("/exit") => break,
            Some("/clear") => {
                let removed = assistant.clear_session(&session_id).await?;
                println!("✓ Cleared {removed} turns");
            }
            Some("/history") => {
                for turn in assistant.history(&session_id).await? {
                    println!("{}: {}", turn.role, turn.content);
                }
            }
            Some("/export") => {
                let format = match words.next() {
                    Some(raw) => raw.parse::<ExportFormat>()?,
                    None => ExportFormat::default(),
                };
                match assistant.export_session(&session_id, format).await {
                    Ok(transcript) => println!("{transcript}"),
                    Err(e) => eprintln!("✗ {e}"),
                }
            }
            Some(command) if command.starts_with('/') => println!("{HELP}"),
            _ => {
                let request = ChatRequest::new(line).in_session(session_id.as_str());
                match assistant.chat(request).await {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => eprintln!("✗ {e}"),
                }
                println!();
            }
        }
    }
    Ok(())
}
