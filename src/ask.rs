//! Streaming question answering: `dqa ask`.
//!
//! Answer tokens are printed to stdout as they arrive from the event stream;
//! once the stream closes, the retrieved source documents follow. Warnings
//! and errors go to stderr so stdout stays a clean transcript.

use anyhow::{bail, Result};
use serde_json::json;
use std::io::Write;

use crate::client::FoundryClient;
use crate::config::Config;
use crate::models::{AnswerRequest, ModelConfiguration};
use crate::stream::AnswerEvent;

pub async fn run_ask(
    config: &Config,
    question: &str,
    collection: &str,
    model: Option<String>,
    retriever: Option<String>,
    top_k: Option<usize>,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    let client = FoundryClient::new(&config.backend)?;

    let model = match model.or_else(|| config.query.model.clone()) {
        Some(m) => m,
        None => {
            let models = client.list_chat_models().await?;
            match models.first() {
                Some(m) => m.name.clone(),
                None => bail!("no chat models enabled on the backend; pass --model"),
            }
        }
    };

    let request = AnswerRequest {
        collection_name: collection.to_string(),
        query: question.to_string(),
        model_configuration: ModelConfiguration { name: model },
        retriever_name: retriever.unwrap_or_else(|| config.query.retriever.clone()),
        retriever_config: json!({ "top_k": top_k.unwrap_or(config.query.top_k) }),
        stream: true,
    };

    let result = client
        .stream_answer(&request, |event| {
            if let AnswerEvent::Answer(chunk) = event {
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            }
        })
        .await?;
    println!();

    if !result.docs.is_empty() {
        println!();
        println!("Sources ({}):", result.docs.len());
        for (i, doc) in result.docs.iter().enumerate() {
            let snippet: String = doc.page_content.chars().take(120).collect();
            println!("  [{}] {}", i + 1, snippet.replace('\n', " "));
        }
    }

    if let Some(error) = result.error {
        bail!("answer stream failed: {}", error);
    }
    Ok(())
}
