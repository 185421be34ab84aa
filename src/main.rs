//! # docqa CLI
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the pgvector schema |
//! | `docqa upload <file>` | Ingest a file and wait for it to finish |
//! | `docqa search "<query>"` | Retrieve ranked chunks |
//! | `docqa documents` | List or search documents |
//! | `docqa chunks <id>` | Show a document's chunks |
//! | `docqa show <id>` | Show one document |
//!
//! Set `RUST_LOG` to change log verbosity (default `info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::commands::{self, SearchMode};
use docqa::config;
use docqa::context::AppContext;
use docqa::migrate;

/// Document ingestion and hybrid retrieval over Postgres + pgvector.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the extension, tables and indexes. Safe to re-run.
    Init,

    /// Ingest a local file.
    ///
    /// The content type is inferred from the file extension unless given.
    Upload {
        path: PathBuf,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Search chunks of completed documents.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: i64,

        #[arg(long, value_enum, default_value_t = SearchMode::Scored)]
        mode: SearchMode,
    },

    /// List documents, optionally by status, or search them by chunk content.
    Documents {
        /// PROCESSING, COMPLETED or FAILED.
        #[arg(long)]
        status: Option<String>,

        /// Case-insensitive substring of chunk content. Lists COMPLETED
        /// documents with at least one matching chunk, newest first.
        #[arg(long)]
        keyword: Option<String>,

        /// Applies to `--keyword` only.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Show a document's chunks in order.
    Chunks { id: String },

    /// Show a document and its chunk count.
    Show { id: String },
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

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let ctx = AppContext::connect(&cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Upload { path, content_type } => {
            commands::run_upload(&ctx, &path, content_type).await?;
        }
        Commands::Search { query, limit, mode } => {
            commands::run_search(&ctx, &query, mode, limit).await?;
        }
        Commands::Documents {
            status,
            keyword,
            limit,
        } => {
            commands::run_documents(&ctx, status, keyword, limit).await?;
        }
        Commands::Chunks { id } => {
            commands::run_chunks(&ctx, &id).await?;
        }
        Commands::Show { id } => {
            commands::run_show(&ctx, &id).await?;
        }
    }

    Ok(())
}
