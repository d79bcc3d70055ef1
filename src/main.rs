//! # doc-memory CLI (`docmem`)
//!
//! ## Usage
//!
//! ```bash
//! docmem --config ./config/docmem.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docmem init` | Create the vector store and its collection |
//! | `docmem ingest <paths>...` | Ingest files, or every supported file under a directory |
//! | `docmem query "<text>"` | Return the chunks closest to the text |
//! | `docmem stats` | Show store location, size, and record counts |
//! | `docmem serve` | Start the HTTP upload server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `doc_memory=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use doc_memory::config::{self, Config};
use doc_memory::services::Services;
use doc_memory::{ingest, query, server, stats, store};

/// doc-memory: ingest PDF, DOCX, and PPTX files into a searchable vector store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used. See
/// `config/docmem.example.toml` for every option.
#[derive(Parser)]
#[command(
    name = "docmem",
    about = "Ingest PDF, DOCX, and PPTX files into a searchable vector store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docmem.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vector store and its cosine collection.
    ///
    /// Idempotent: running it against an existing store is safe.
    Init,

    /// Ingest documents.
    ///
    /// Each path is a `.pdf`, `.docx`, or `.pptx` file, or a directory that
    /// is walked recursively for those extensions.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Find the stored chunks most similar to a piece of text.
    Query {
        text: String,

        /// Number of matches to return (default `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show store statistics.
    Stats,

    /// Start the HTTP upload server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("doc_memory=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(path: &std::path::Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let cfg = Config::default();
        config::validate(&cfg)?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = store::open_store(&cfg).await?;
            store.close().await?;
            println!(
                "Vector store initialized (collection '{}').",
                cfg.store.collection
            );
        }
        Commands::Ingest { paths } => {
            ingest::run_ingest(&cfg, &paths).await?;
        }
        Commands::Query { text, top_k } => {
            query::run_query(&cfg, &text, top_k).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            let services = Services::init(cfg).await?;
            server::run_server(services).await?;
        }
    }

    Ok(())
}
