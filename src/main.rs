//! # ragdrop CLI
//!
//! ## Usage
//!
//! ```bash
//! ragdrop --config ./config/ragdrop.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdrop serve` | Initial scan, folder watcher and HTTP API |
//! | `ragdrop index <path>` | Index one file unless its current version is already indexed |
//! | `ragdrop query "<question>"` | Retrieve contexts and print the generated answer |
//! | `ragdrop reindex` | Forget recorded hashes and index the whole watched folder |
//! | `ragdrop documents` | List indexed sources and watched-folder documents |
//! | `ragdrop stats` | Vector count, dimensionality and registry size |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ragdrop::config;
use ragdrop::engine::Engine;
use ragdrop::server;
use ragdrop::watcher::DocumentWatcher;

/// Index a folder of documents and answer questions about them.
#[derive(Parser)]
#[command(name = "ragdrop", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragdrop.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Indexes anything new in the watched folder, starts the watcher
    /// (unless disabled), then serves on `[server].bind`.
    Serve {
        /// Do not start the folder watcher.
        #[arg(long)]
        no_watch: bool,
    },

    /// Index a single document.
    Index {
        /// Path to a .pdf, .docx or .pptx file.
        path: PathBuf,
    },

    /// Ask a question against the index.
    Query {
        /// The question.
        query: String,
    },

    /// Clear the registry and index every document in the watched folder.
    Reindex,

    /// List indexed sources and documents in the watched folder.
    Documents,

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let engine = Arc::new(Engine::from_config(cfg)?);

    match cli.command {
        Commands::Serve { no_watch } => {
            let _watcher = if no_watch || !engine.config().watch.enabled {
                engine.initial_scan().await?;
                None
            } else {
                Some(DocumentWatcher::start_with_initial_scan(Arc::clone(&engine)).await?)
            };
            server::run_server(engine).await?;
        }
        Commands::Index { path } => match engine.ingest_path(&path).await? {
            Some(report) => {
                println!("indexed {}", path.display());
                println!("  chunks: {}", report.chunks);
                println!("  stored: {}", report.stored);
                if report.failed > 0 {
                    println!("  failed: {}", report.failed);
                }
            }
            None => println!("unchanged, skipped {}", path.display()),
        },
        Commands::Query { query } => {
            let answer = engine.chat(&query, None).await;
            println!("{}", answer.response);
            if !answer.contexts.is_empty() {
                println!();
                println!("contexts:");
                for (i, ctx) in answer.contexts.iter().enumerate() {
                    println!(
                        "  {}. {} ({}) distance={:.4}",
                        i + 1,
                        ctx.source,
                        ctx.chunk_id,
                        ctx.similarity
                    );
                }
            }
        }
        Commands::Reindex => {
            let n = engine.reindex_all().await?;
            println!(
                "Reindexed {} documents from {}",
                n,
                engine.watch_dir().display()
            );
        }
        Commands::Documents => {
            let listing = engine.list_documents()?;
            println!("indexed sources: {}", listing.indexed_documents.len());
            for source in &listing.indexed_documents {
                println!("  {}", source);
            }
            println!("watched folder: {}", engine.watch_dir().display());
            for doc in &listing.folder_documents {
                let mark = if doc.indexed { "indexed" } else { "pending" };
                println!("  {:<40} {:>10} bytes  {}", doc.filename, doc.size, mark);
            }
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("vectors:        {}", stats.vectors);
            println!("dimensions:     {}", stats.dims);
            println!("sources:        {}", stats.sources.len());
            println!("registry files: {}", stats.registry_files);
        }
    }

    Ok(())
}
