use anyhow::Result;

use crate::client::FoundryClient;
use crate::config::Config;

pub async fn run_list(config: &Config) -> Result<()> {
    let client = FoundryClient::new(&config.backend)?;
    let models = client.list_chat_models().await?;

    println!("{:<48} PROVIDER", "MODEL");
    for m in &models {
        println!("{:<48} {}", m.name, m.provider.as_deref().unwrap_or("-"));
    }
    println!("{} chat models", models.len());
    Ok(())
}
