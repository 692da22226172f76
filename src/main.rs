//! # Replydesk CLI (`replydesk`)
//!
//! ## Usage
//!
//! ```bash
//! replydesk --config ./config/replydesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `replydesk prepare` | Normalize the raw corpus into the knowledge base |
//! | `replydesk index build` | Embed the knowledge base into the retrieval index |
//! | `replydesk index info` | Show index metadata and staleness |
//! | `replydesk search "<query>"` | Show the templates retrieval would pick |
//! | `replydesk check <sender> <subject>` | Run the eligibility classifier |
//! | `replydesk draft "<message>"` | Compose a reply without sending it |
//! | `replydesk run` | Poll the mailbox and reply until Ctrl-C |
//!
//! Logging goes to stderr via `tracing`; set `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use replydesk::{check_cmd, config, index_cmd, prepare_cmd, run_cmd, search};

/// Replydesk: retrieval-grounded auto-replies for a support mailbox.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/replydesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "replydesk",
    about = "Replydesk: retrieval-grounded auto-replies for a support mailbox",
    version,
    long_about = "Replydesk turns a corpus of canned support replies into a searchable \
    knowledge base, then polls a mailbox and answers eligible messages in the house style, \
    grounded in the closest matching templates."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/replydesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the raw reply corpus into the knowledge-base JSON file.
    Prepare {
        /// Corpus file (defaults to `paths.corpus`).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Knowledge-base output (defaults to `paths.knowledge_base`).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Build or inspect the retrieval index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Query the retrieval index.
    Search {
        /// Text to match against the templates.
        query: String,

        /// Number of templates to return (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Check whether a message would be eligible for an automated reply.
    Check {
        sender: String,
        subject: String,

        /// Value of the message's `Auto-Submitted` header.
        #[arg(long)]
        auto_submitted: Option<String>,
    },

    /// Compose a reply to a message and print it without sending.
    Draft {
        /// The customer's message body.
        message: String,
    },

    /// Run the mailbox session loop.
    Run {
        /// Process a single poll (and its reply, if any), then exit.
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed every knowledge-base record and replace the stored index.
    Build {
        /// Override the batch size from config (texts per embedding call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print stored index metadata and whether it matches the knowledge base.
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Prepare { input, output } => {
            prepare_cmd::run_prepare(&cfg, input, output)?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build { batch_size } => {
                index_cmd::run_index_build(&cfg, batch_size).await?;
            }
            IndexAction::Info => {
                index_cmd::run_index_info(&cfg).await?;
            }
        },
        Commands::Search { query, k } => {
            search::run_search(&cfg, &query, k).await?;
        }
        Commands::Check {
            sender,
            subject,
            auto_submitted,
        } => {
            check_cmd::run_check(&cfg, &sender, &subject, auto_submitted.as_deref())?;
        }
        Commands::Draft { message } => {
            run_cmd::run_draft(&cfg, &message).await?;
        }
        Commands::Run { once } => {
            run_cmd::run_agent(&cfg, once).await?;
        }
    }

    Ok(())
}
