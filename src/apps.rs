//! RAG application commands: save a collection + model + retriever + prompt
//! combination as a named app and emit the snippet that embeds it.

use anyhow::Result;
use serde_json::json;

use crate::client::FoundryClient;
use crate::config::Config;
use crate::models::{RagApp, RagAppConfig};
use crate::validate;

pub async fn run_list(config: &Config) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let apps = client.list_apps().await?;

    println!("{:<28} {:<24} MODEL", "APP", "COLLECTION");
    for app in &apps {
        println!(
            "{:<28} {:<24} {}",
            app.name, app.config.collection_name, app.config.model_name
        );
    }
    println!("{} apps", apps.len());
    Ok(())
}

pub async fn run_get(config: &Config, name: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let app = client.get_app(name).await?;

    println!("name:       {}", app.name);
    println!("collection: {}", app.config.collection_name);
    println!("model:      {}", app.config.model_name);
    println!("retriever:  {}", app.config.retriever_name);
    if let Some(prompt) = &app.config.system_prompt {
        println!("prompt:     {}", prompt);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_create(
    config: &Config,
    name: &str,
    collection: &str,
    model: &str,
    retriever: Option<String>,
    top_k: Option<usize>,
    prompt: Option<String>,
) -> Result<()> {
    // App names share the collection-name rules; they end up in URLs too.
    validate::check_collection_name(name)?;

    let client = FoundryClient::new(&config.backend)?;
    let created = client
        .create_app(&RagApp {
            name: name.to_string(),
            config: RagAppConfig {
                collection_name: collection.to_string(),
                model_name: model.to_string(),
                retriever_name: retriever.unwrap_or_else(|| config.query.retriever.clone()),
                retriever_config: json!({ "top_k": top_k.unwrap_or(config.query.top_k) }),
                system_prompt: prompt,
            },
        })
        .await?;

    println!("Created app '{}'.", created.name);
    Ok(())
}

pub async fn run_delete(config: &Config, name: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    client.delete_app(name).await?;
    println!("Deleted app '{}'.", name);
    Ok(())
}

/// Print the HTML snippet that embeds an app's hosted Q&A page.
pub async fn run_embed_snippet(config: &Config, name: &str) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    // Verifies the app exists before handing out a snippet.
    let app = client.get_app(name).await?;

    println!("{}", embed_snippet(&config.backend.base_url, &app.name));
    Ok(())
}

pub fn embed_snippet(base_url: &str, app_name: &str) -> String {
    format!(
        "<iframe\n  src=\"{}/embed/{}\"\n  width=\"420\"\n  height=\"640\"\n  style=\"border: none;\"\n></iframe>",
        base_url.trim_end_matches('/'),
        app_name
    )
}
