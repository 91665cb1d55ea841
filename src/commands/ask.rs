use campus_runtime::tools::CollectionRegistry;
use campus_runtime::{ChatReply, ChatRequest, Config, QueryClassifier};

use super::build_assistant;

pub async fn run(
    config: Config,
    message: String,
    session: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let assistant = build_assistant(config).await?;
    let request = ChatRequest {
        message,
        session_id: session,
        user_id: None,
    };
    let reply = assistant.chat(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
    }
    Ok(())
}

pub fn print_reply(reply: &ChatReply) {
    println!("{}\n", reply.response);
    println!("confidence: {}  route: {}", reply.confidence, reply.route);
    if reply.partial {
        println!("note: some sources were unavailable for this answer");
    }
    if !reply.sources.is_empty() {
        println!("sources:");
        for source in &reply.sources {
            println!("  • {}", source.tag());
        }
    }
    if !reply.suggestions.is_empty() {
        println!("you could also ask:");
        for suggestion in &reply.suggestions {
            println!("  • {suggestion}");
        }
    }
}

/// Print the routing decision without touching the index or the stores.
pub fn classify(config: Config, message: &str) -> anyhow::Result<()> {
    let registry = CollectionRegistry::default();
    let classifier = QueryClassifier::new(&config.classification, &registry)?;
    let decision = classifier.classify(message);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
