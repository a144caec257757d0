//! # finqa CLI
//!
//! ## Usage
//!
//! ```bash
//! finqa --config ./config/finqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `finqa ingest` | Build (or reuse) the snapshot and rebuild the search index |
//! | `finqa search "<query>"` | Print the ranked documents for a query |
//! | `finqa ask "<query>"` | Answer one question and print the reply |
//! | `finqa serve` | Start the web form |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use finqa::config;
use finqa::ingest::{self, IngestOptions};
use finqa::progress::ProgressMode;
use finqa::search;
use finqa::server;

/// finqa: retrieval-augmented Q&A over financial 10-K filings.
#[derive(Parser)]
#[command(
    name = "finqa",
    about = "finqa: retrieval-augmented Q&A over financial 10-K filings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/finqa.toml`. A missing file is an error.
    #[arg(long, global = true, default_value = "./config/finqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the dataset and rebuild the search index.
    ///
    /// Reuses the snapshot when it exists; the index is always deleted
    /// and rebuilt.
    Ingest {
        /// Recompute the snapshot from the CSV even if one exists.
        #[arg(long)]
        refresh_snapshot: bool,

        /// Stop after the snapshot is written; leave the index untouched.
        #[arg(long)]
        skip_index: bool,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,
    },

    /// Search the index and print the ranked documents.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[search].size`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        query: String,
    },

    /// Start the web form.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            refresh_snapshot,
            skip_index,
            progress,
        } => {
            let reporter = progress.reporter();
            let options = IngestOptions {
                refresh_snapshot,
                skip_index,
            };
            ingest::run_ingest(&cfg, options, reporter.as_ref()).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { query } => {
            search::run_ask(&cfg, &query).await?;
        }
        Commands::Serve { bind } => {
            server::run_server(&cfg, bind).await?;
        }
    }

    Ok(())
}
