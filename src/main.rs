#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

mod commands;

#[derive(Parser)]
#[command(name = "campus-assist")]
#[command(about = "Campus Assist - academic portal question routing and retrieval")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Host address to bind to
        #[arg(long, value_name = "HOST")]
        host: Option<String>,
        /// Port to bind the server to
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Answer a single question
    Ask {
        message: String,
        /// Reuse a session id
        #[arg(short, long)]
        session: Option<String>,
        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive multi-turn conversation on stdin
    Chat {
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Show how a question would be routed
    Classify { message: String },
    /// Rebuild the embedding index and print its statistics
    Rebuild {
        /// Knowledge file or directory; defaults to the configured path
        #[arg(short, long, value_name = "PATH")]
        knowledge: Option<PathBuf>,
    },
    /// Run a structured record tool directly
    Tools {
        #[command(subcommand)]
        tool: commands::tools::ToolCommand,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {e:#}");
            process::exit(2);
        }
    };
    commands::init_tracing(&config.logging);

    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port).await,
        Commands::Ask {
            message,
            session,
            json,
        } => commands::ask::run(config, message, session, json).await,
        Commands::Chat { session } => commands::chat::run(config, session).await,
        Commands::Classify { message } => commands::ask::classify(config, &message),
        Commands::Rebuild { knowledge } => commands::rebuild::run(config, knowledge).await,
        Commands::Tools { tool } => commands::tools::run(config, tool).await,
    };

    if let Err(e) = result {
        eprintln!("✗ {e:#}");
        process::exit(1);
    }
}
