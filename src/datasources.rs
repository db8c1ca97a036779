//! Data source commands: list, register web and structured sources, delete.
//!
//! Uploaded-directory sources are registered by the upload pipeline
//! (see [`crate::upload`]); this module covers the other source kinds.

use anyhow::Result;
use serde_json::json;

use crate::client::FoundryClient;
use crate::config::Config;
use crate::models::DataSourceType;
use crate::validate;

pub async fn run_list(config: &Config) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let sources = client.list_data_sources().await?;

    println!("{:<12} {:<50} FQN", "TYPE", "URI");
    for s in &sources {
        println!("{:<12} {:<50} {}", s.kind.to_string(), s.uri, s.fqn);
    }
    println!("{} data sources", sources.len());
    Ok(())
}

pub async fn run_add_web(config: &Config, url: &str) -> Result<()> {
    validate::check_source_url(url)?;

    let client = FoundryClient::new(&config.backend)?;
    let source = client
        .create_data_source(DataSourceType::Web, url, json!({}))
        .await?;
    println!("Registered web source: {}", source.fqn);
    Ok(())
}

pub async fn run_add_structured(config: &Config, uri: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let source = client
        .create_data_source(DataSourceType::Structured, uri, json!({}))
        .await?;
    println!("Registered structured source: {}", source.fqn);
    Ok(())
}

pub async fn run_delete(config: &Config, fqn: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    client.delete_data_source(fqn).await?;
    println!("Deleted data source {}.", fqn);
    Ok(())
}
