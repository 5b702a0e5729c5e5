//! # Agri Assist CLI (`agri`)
//!
//! Runs the HTTP API and offers a few commands for trying the chatbot and
//! the knowledge base from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! agri --config ./config/agri.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `agri serve` | Start the HTTP API |
//! | `agri ask "<message>"` | Answer one message through the full pipeline |
//! | `agri retrieve "<query>"` | Print the knowledge-base context for a query |
//! | `agri topics` | List the chatbot topics |
//!
//! When the config file does not exist every section falls back to its
//! defaults. Set `RUST_LOG` to change the log level (default `info`).

use agri_assist::chatbot::ChatbotService;
use agri_assist::config::{self, Config};
use agri_assist::knowledge::KnowledgeBase;
use agri_assist::server;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Agri Assist: agriculture chatbot, fertilizer schedules and disease
/// detection API.
#[derive(Parser)]
#[command(
    name = "agri",
    about = "Agri Assist: retrieval-augmented agriculture chatbot and farm API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/agri.toml`. See `config/agri.example.toml`.
    #[arg(long, global = true, default_value = "./config/agri.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server on `[server].bind`.
    Serve,

    /// Answer a single message.
    ///
    /// Uses the same backend cascade as the server. Prints the answer and
    /// its confidence.
    Ask {
        /// The question to ask.
        message: String,
    },

    /// Show the knowledge-base context retrieved for a query.
    Retrieve {
        query: String,

        /// Maximum number of context blocks.
        #[arg(long, default_value_t = 3)]
        max_results: usize,
    },

    /// List chatbot topics.
    Topics,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::info!("{} not found, using default configuration", path.display());
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { message } => {
            if message.trim().is_empty() {
                anyhow::bail!("message must not be empty");
            }
            let kb = Arc::new(KnowledgeBase::load(cfg.knowledge_base.path.as_deref())?);
            let bot = ChatbotService::initialize(&cfg, kb).await;
            let reply = bot.get_response(&message, &[]).await;
            println!("{}", reply.bot_response);
            println!();
            println!(
                "(confidence {:.2}, backend {})",
                reply.confidence,
                bot.active_backend().as_str()
            );
        }
        Commands::Retrieve { query, max_results } => {
            let kb = KnowledgeBase::load(cfg.knowledge_base.path.as_deref())?;
            let context = kb.retrieve(&query, max_results);
            if context.is_empty() {
                println!("No matching knowledge-base records.");
            } else {
                println!("{}", context);
            }
        }
        Commands::Topics => {
            let kb = Arc::new(KnowledgeBase::load(cfg.knowledge_base.path.as_deref())?);
            let bot = ChatbotService::fallback_only(kb.clone());
            println!("Chatbot topics: {}", bot.topics().join(", "));
            println!();
            println!("Knowledge base:");
            println!(
                "  crops:  {}",
                kb.crops()
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "  pests:  {}",
                kb.pests()
                    .iter()
                    .map(|p| p.display_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "  topics: {}",
                kb.topics()
                    .iter()
                    .map(|t| t.display_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}
