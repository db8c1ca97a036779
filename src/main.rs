//! # DocsQA CLI (`dqa`)
//!
//! The `dqa` binary is the operator interface for a QA Foundry backend. It
//! provides commands for collection management, data source registration and
//! synchronization, batched uploads, streaming question answering, RAG app
//! packaging, and the companion static/proxy server.
//!
//! ## Usage
//!
//! ```bash
//! dqa --config ./config/dqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa collections ...` | List, inspect, create, delete, link, unlink |
//! | `dqa sources ...` | List and register data sources |
//! | `dqa upload <dir>` | Upload a directory via the batched signed-URL protocol |
//! | `dqa sync <collection>` | Trigger ingestion runs for linked sources |
//! | `dqa runs <collection>` | List runs or poll one run's status |
//! | `dqa models` | List enabled chat models |
//! | `dqa apps ...` | Manage embeddable RAG applications |
//! | `dqa ask "<question>"` | Stream an answer for a collection |
//! | `dqa serve` | Serve SPA assets and reverse-proxy the backend |

mod apps;
mod ask;
mod cache;
mod chat_models;
mod client;
mod collections;
mod config;
mod datasources;
mod models;
mod serve;
mod stream;
mod upload;
mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DocsQA CLI — manage collections, data sources, and streaming Q&A against
/// a QA Foundry backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "DocsQA — collections, data sources, and streaming Q&A for a QA Foundry backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage collections.
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },

    /// Manage data sources.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Upload a local directory as a data source.
    ///
    /// Files are uploaded through signed URLs in batches of up to 50 paths;
    /// PUTs inside a batch run concurrently, batches run sequentially. Failed
    /// files are reported and excluded; the directory is registered once at
    /// the end.
    Upload {
        /// Directory to upload.
        dir: PathBuf,

        /// Name for the upload directory (defaults to a generated id).
        #[arg(long)]
        name: Option<String>,
    },

    /// Trigger ingestion runs for a collection's linked sources.
    Sync {
        /// Collection name.
        collection: String,

        /// Sync only this data source fqn (defaults to every linked source).
        #[arg(long)]
        source: Option<String>,
    },

    /// List ingestion runs, or show one run's status.
    Runs {
        /// Collection name.
        collection: String,

        /// Show the current status of this run instead of listing.
        #[arg(long)]
        run: Option<String>,
    },

    /// List chat models enabled on the backend.
    Models,

    /// Manage embeddable RAG applications.
    Apps {
        #[command(subcommand)]
        action: AppsAction,
    },

    /// Ask a question against a collection, streaming the answer.
    Ask {
        /// The question.
        question: String,

        /// Collection to query.
        #[arg(long)]
        collection: String,

        /// Chat model (defaults to `[query].model`, then the backend's first).
        #[arg(long)]
        model: Option<String>,

        /// Retriever name (defaults to `[query].retriever`).
        #[arg(long)]
        retriever: Option<String>,

        /// Number of chunks to retrieve (defaults to `[query].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Serve the compiled SPA and reverse-proxy the backend APIs.
    Serve,
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// List all collections.
    List,
    /// Show one collection with its linked data sources.
    Get { name: String },
    /// Create a collection with an embedding configuration.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Embedding model (e.g. `openai-main/text-embedding-3-small`).
        #[arg(long)]
        model: String,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Delete a collection.
    Delete { name: String },
    /// Link a data source to a collection.
    Link { name: String, source_fqn: String },
    /// Unlink a data source from a collection.
    Unlink { name: String, source_fqn: String },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List all registered data sources.
    List,
    /// Register a web page or site for crawling.
    AddWeb { url: String },
    /// Register a structured database by connection URI.
    AddStructured { uri: String },
    /// Delete a data source by fqn.
    Delete { fqn: String },
}

#[derive(Subcommand)]
enum AppsAction {
    /// List all RAG apps.
    List,
    /// Show one app's configuration.
    Get { name: String },
    /// Save a collection + model + retriever + prompt as an app.
    Create {
        name: String,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        retriever: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Delete an app.
    Delete { name: String },
    /// Print the HTML snippet that embeds an app.
    EmbedSnippet { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Collections { action } => match action {
            CollectionsAction::List => collections::run_list(&cfg).await?,
            CollectionsAction::Get { name } => collections::run_get(&cfg, &name).await?,
            CollectionsAction::Create {
                name,
                description,
                model,
                chunk_size,
            } => collections::run_create(&cfg, &name, description, &model, chunk_size).await?,
            CollectionsAction::Delete { name } => collections::run_delete(&cfg, &name).await?,
            CollectionsAction::Link { name, source_fqn } => {
                collections::run_link(&cfg, &name, &source_fqn).await?
            }
            CollectionsAction::Unlink { name, source_fqn } => {
                collections::run_unlink(&cfg, &name, &source_fqn).await?
            }
        },
        Commands::Sources { action } => match action {
            SourcesAction::List => datasources::run_list(&cfg).await?,
            SourcesAction::AddWeb { url } => datasources::run_add_web(&cfg, &url).await?,
            SourcesAction::AddStructured { uri } => {
                datasources::run_add_structured(&cfg, &uri).await?
            }
            SourcesAction::Delete { fqn } => datasources::run_delete(&cfg, &fqn).await?,
        },
        Commands::Upload { dir, name } => upload::run_upload(&cfg, &dir, name).await?,
        Commands::Sync { collection, source } => {
            collections::run_sync(&cfg, &collection, source).await?
        }
        Commands::Runs { collection, run } => collections::run_runs(&cfg, &collection, run).await?,
        Commands::Models => chat_models::run_list(&cfg).await?,
        Commands::Apps { action } => match action {
            AppsAction::List => apps::run_list(&cfg).await?,
            AppsAction::Get { name } => apps::run_get(&cfg, &name).await?,
            AppsAction::Create {
                name,
                collection,
                model,
                retriever,
                top_k,
                prompt,
            } => {
                apps::run_create(&cfg, &name, &collection, &model, retriever, top_k, prompt).await?
            }
            AppsAction::Delete { name } => apps::run_delete(&cfg, &name).await?,
            AppsAction::EmbedSnippet { name } => apps::run_embed_snippet(&cfg, &name).await?,
        },
        Commands::Ask {
            question,
            collection,
            model,
            retriever,
            top_k,
        } => ask::run_ask(&cfg, &question, &collection, model, retriever, top_k).await?,
        Commands::Serve => serve::run_server(&cfg).await?,
    }

    Ok(())
}
