//! Collection management commands: list, inspect, create, delete, link and
//! unlink data sources, trigger synchronization, and follow ingestion runs.

use anyhow::{bail, Result};
use serde_json::json;

use crate::client::FoundryClient;
use crate::config::Config;
use crate::models::{AssociatedDataSource, Collection, EmbedderConfig, IngestionStatus};
use crate::validate;

pub async fn run_list(config: &Config) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let collections = client.list_collections().await?;

    println!("{:<32} {:<40} SOURCES", "NAME", "EMBEDDER");
    for c in &collections {
        println!(
            "{:<32} {:<40} {}",
            c.name,
            c.embedder_config.model,
            c.associated_data_sources.len()
        );
    }
    println!("{} collections", collections.len());
    Ok(())
}

pub async fn run_get(config: &Config, name: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let c = client.get_collection(name).await?;

    println!("name:        {}", c.name);
    if let Some(desc) = &c.description {
        println!("description: {}", desc);
    }
    println!("embedder:    {}", c.embedder_config.model);
    if let Some(chunk_size) = c.embedder_config.chunk_size {
        println!("chunk size:  {}", chunk_size);
    }
    println!("data sources:");
    for source in &c.associated_data_sources {
        println!("  {}", source.data_source_fqn);
    }
    Ok(())
}

pub async fn run_create(
    config: &Config,
    name: &str,
    description: Option<String>,
    model: &str,
    chunk_size: Option<usize>,
) -> Result<()> {
    validate::check_collection_name(name)?;

    let client = FoundryClient::new(&config.backend)?;
    let created = client
        .create_collection(&Collection {
            name: name.to_string(),
            description,
            embedder_config: EmbedderConfig {
                model: model.to_string(),
                chunk_size,
            },
            associated_data_sources: Vec::new(),
        })
        .await?;

    println!("Created collection '{}'.", created.name);
    Ok(())
}

pub async fn run_delete(config: &Config, name: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    client.delete_collection(name).await?;
    println!("Deleted collection '{}'.", name);
    Ok(())
}

pub async fn run_link(config: &Config, name: &str, fqn: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    client
        .link_data_source(
            name,
            &AssociatedDataSource {
                data_source_fqn: fqn.to_string(),
                parser_config: json!({}),
            },
        )
        .await?;
    println!("Linked {} to '{}'.", fqn, name);
    Ok(())
}

pub async fn run_unlink(config: &Config, name: &str, fqn: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    client.unlink_data_source(name, fqn).await?;
    println!("Unlinked {} from '{}'.", fqn, name);
    Ok(())
}

/// Trigger ingestion for one linked source, or for every linked source when
/// `source` is `None`.
pub async fn run_sync(config: &Config, name: &str, source: Option<String>) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;

    let fqns: Vec<String> = match source {
        Some(fqn) => vec![fqn],
        None => {
            let collection = client.get_collection(name).await?;
            collection
                .associated_data_sources
                .iter()
                .map(|s| s.data_source_fqn.clone())
                .collect()
        }
    };
    if fqns.is_empty() {
        bail!("collection '{}' has no linked data sources", name);
    }

    println!("sync {}", name);
    for fqn in &fqns {
        let run = client.trigger_ingestion(name, fqn).await?;
        println!("  {} -> run {} ({})", fqn, run.name, run.status);
    }
    println!("ok");
    Ok(())
}

/// List runs for a collection, or show one run's current status.
pub async fn run_runs(config: &Config, name: &str, run: Option<String>) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;

    match run {
        Some(run_name) => {
            let run = client.get_ingestion_run(name, &run_name).await?;
            println!("run:    {}", run.name);
            println!("source: {}", run.data_source_fqn);
            println!("status: {}", format_run_status(run.status));
            if let Some(message) = &run.message {
                println!("message: {}", message);
            }
        }
        None => {
            let runs = client.list_ingestion_runs(name).await?;
            println!("{:<28} {:<40} STATUS", "RUN", "SOURCE");
            for run in &runs {
                println!("{:<28} {:<40} {}", run.name, run.data_source_fqn, run.status);
            }
            println!("{} runs", runs.len());
        }
    }
    Ok(())
}

/// Status line for the single-run view; runs that have not reached a
/// terminal state get a re-poll hint.
fn format_run_status(status: IngestionStatus) -> String {
    if status.is_terminal() {
        status.to_string()
    } else {
        format!("{} (in progress; re-run to poll)", status)
    }
}
