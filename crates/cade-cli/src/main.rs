use anyhow::Result;
use cade_execution::{DispatchEvent, DispatchEventLayer};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(name = "cade")]
#[command(about = "CADE - Conversation-Aware Dispatch Engine", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $CADE_CONFIG, then the user config dir)
    #[arg(long, global = true, env = "CADE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a first-turn query to a capability
    Route {
        query: String,
        /// Optional conversation context
        #[arg(long)]
        context: Option<String>,
    },
    /// Show optimizer hints for a message
    Hints {
        message: String,
        /// Earlier turns, oldest first
        #[arg(long = "context")]
        context: Vec<String>,
        /// Capability the caller intends to use
        #[arg(long)]
        capability: Option<String>,
    },
    /// Interactive dispatch session with built-in template capabilities
    Chat {
        /// Resume or name a session (a new id is generated otherwise)
        #[arg(long)]
        session: Option<String>,
        /// Print dispatch events as they happen
        #[arg(long)]
        events: bool,
    },
    /// Print the resolved configuration as TOML
    Config,
}

fn init_tracing(events: Option<mpsc::UnboundedSender<DispatchEvent>>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cade=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(events.map(DispatchEventLayer::new))
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Route { query, context } => {
            init_tracing(None);
            commands::route::run(config_path, &query, context.as_deref()).await?
        }
        Commands::Hints {
            message,
            context,
            capability,
        } => {
            init_tracing(None);
            commands::hints::run(config_path, message, context, capability)?
        }
        Commands::Chat { session, events } => {
            let receiver = if events {
                let (tx, rx) = mpsc::unbounded_channel();
                init_tracing(Some(tx));
                Some(rx)
            } else {
                init_tracing(None);
                None
            };
            commands::chat::run(config_path, session, receiver).await?
        }
        Commands::Config => {
            init_tracing(None);
            commands::config::run(config_path)?
        }
    }

    Ok(())
}
