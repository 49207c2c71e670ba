//! # incident-rag CLI (`irag`)
//!
//! ## Usage
//!
//! ```bash
//! irag --config ./config/irag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `irag init` | Create the SQLite database and run schema migrations |
//! | `irag ingest <file>` | Ingest a `.csv` or `.json` ticket export |
//! | `irag search "<query>"` | Find similar past incidents |
//! | `irag stats` | Incident and embedding counts |
//! | `irag incidents "<period>"` | Incidents created in a period ("2 weeks", "10") |
//! | `irag ask "<message>"` | Let the chat model pick and run tools |
//! | `irag serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use incident_rag::{config, dispatch, ingest, migrate, search, server, stats, summary};

/// Incident retrieval and tool dispatch over historical support tickets.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "irag",
    about = "Incident retrieval and LLM tool dispatch over historical support tickets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/irag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the incident tables. Safe to
    /// run repeatedly.
    Init,

    /// Ingest ticket rows from a CSV or JSON export.
    ///
    /// Rows whose incident number is missing or already stored are
    /// skipped. Column names come from the `[ingest]` config section.
    Ingest {
        /// Path to a `.csv` file or a `.json` array of objects.
        file: PathBuf,
    },

    /// Find past incidents similar to a query.
    Search {
        /// Free-text problem description.
        query: String,

        /// Maximum number of matches.
        #[arg(long)]
        limit: Option<i64>,

        /// Only match one aspect: `description`, `resolution`, or `combined`.
        #[arg(long)]
        content_type: Option<String>,

        /// Case-insensitive product substring filter.
        #[arg(long)]
        product: Option<String>,

        /// Minimum similarity in [0, 1].
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Show incident and embedding counts.
    Stats,

    /// List incidents created in a period such as "2 weeks" or "10".
    Incidents {
        period: String,
    },

    /// Send a message to the chat model and run the tools it calls.
    Ask {
        message: String,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, &file).await?;
        }
        Commands::Search {
            query,
            limit,
            content_type,
            product,
            threshold,
        } => {
            let mut params = search::SearchParams::new(query, &cfg.retrieval);
            if let Some(limit) = limit {
                anyhow::ensure!(limit >= 1, "--limit must be >= 1");
                params.limit = limit;
            }
            if let Some(threshold) = threshold {
                anyhow::ensure!(
                    (0.0..=1.0).contains(&threshold),
                    "--threshold must be between 0 and 1"
                );
                params.similarity_threshold = threshold;
            }
            params.content_type = content_type.map(|ct| ct.parse()).transpose()?;
            params.product_filter = product;
            search::run_search(&cfg, params).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Incidents { period } => {
            summary::run_incidents(&cfg, &period).await?;
        }
        Commands::Ask { message } => {
            dispatch::run_ask(&cfg, &message).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
