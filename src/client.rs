//! Typed REST + SSE client for the QA Foundry backend.
//!
//! All reads go through the tag-indexed [`QueryCache`]; all mutations
//! invalidate the tags they affect, so the next read refetches. There is no
//! retry policy anywhere — a failed request surfaces one extracted message
//! and nothing else (the backend owns idempotency).
//!
//! # Error Contract
//!
//! Non-2xx responses are reduced to a human message by probing, in order:
//! `detail[0].msg` (FastAPI validation shape), `detail` as a string,
//! `error.message`, `message`, then the raw body.

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{QueryCache, Tag};
use crate::config::BackendConfig;
use crate::models::{
    AnswerRequest, AssociatedDataSource, ChatModel, Collection, DataSource, DataSourceType,
    IngestionRun, RagApp,
};
use crate::stream::{decode_event, AnswerAccumulator, AnswerEvent, SseParser};
use crate::upload::MAX_PATHS_PER_BATCH;

pub struct FoundryClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    pub cache: QueryCache,
}

impl FoundryClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env).ok();
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            cache: QueryCache::new(),
        })
    }

    /// The underlying HTTP client, for signed-URL uploads that bypass the API
    /// base (the backend signs those URLs; no bearer token is attached).
    pub fn http_client(&self) -> Client {
        self.http.clone()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        self.send(self.request(Method::GET, path), path).await
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value> {
        self.send(self.request(method, path).json(body), path).await
    }

    async fn send(&self, req: RequestBuilder, path: &str) -> Result<Value> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("{} ({}): {}", path, status, extract_error_message(&body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).with_context(|| format!("invalid JSON from {}", path))
    }

    // ============ Collections ============

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        const KEY: &str = "collections";
        if let Some(v) = self.cache.get(KEY) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self.get_json("/v1/collections").await?;
        let list: Vec<Collection> = from_field(&v, "collections")?;
        let mut provides = vec![Tag::Collections];
        provides.extend(list.iter().map(|c| Tag::Collection(c.name.clone())));
        self.cache.put(KEY, provides, serde_json::to_value(&list)?);
        Ok(list)
    }

    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        let key = format!("collections/{}", name);
        if let Some(v) = self.cache.get(&key) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self.get_json(&format!("/v1/collections/{}", name)).await?;
        let collection: Collection = serde_json::from_value(v)?;
        self.cache.put(
            key,
            vec![Tag::Collection(name.to_string())],
            serde_json::to_value(&collection)?,
        );
        Ok(collection)
    }

    pub async fn create_collection(&self, collection: &Collection) -> Result<Collection> {
        let v = self
            .send_json(
                Method::POST,
                "/v1/collections",
                &serde_json::to_value(collection)?,
            )
            .await?;
        self.cache.invalidate(&[Tag::Collections]);
        Ok(serde_json::from_value(v)?)
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.send(
            self.request(Method::DELETE, &format!("/v1/collections/{}", name)),
            "/v1/collections",
        )
        .await?;
        self.cache
            .invalidate(&[Tag::Collections, Tag::Collection(name.to_string())]);
        Ok(())
    }

    pub async fn link_data_source(
        &self,
        collection: &str,
        source: &AssociatedDataSource,
    ) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/v1/collections/{}/data-sources", collection),
            &serde_json::to_value(source)?,
        )
        .await?;
        self.cache
            .invalidate(&[Tag::Collections, Tag::Collection(collection.to_string())]);
        Ok(())
    }

    pub async fn unlink_data_source(&self, collection: &str, fqn: &str) -> Result<()> {
        self.send_json(
            Method::POST,
            &format!("/v1/collections/{}/unlink", collection),
            &json!({ "data_source_fqn": fqn }),
        )
        .await?;
        self.cache
            .invalidate(&[Tag::Collections, Tag::Collection(collection.to_string())]);
        Ok(())
    }

    // ============ Data sources ============

    pub async fn list_data_sources(&self) -> Result<Vec<DataSource>> {
        const KEY: &str = "data-sources";
        if let Some(v) = self.cache.get(KEY) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self.get_json("/v1/data-sources").await?;
        let list: Vec<DataSource> = from_field(&v, "data_sources")?;
        self.cache
            .put(KEY, vec![Tag::DataSources], serde_json::to_value(&list)?);
        Ok(list)
    }

    pub async fn create_data_source(
        &self,
        kind: DataSourceType,
        uri: &str,
        metadata: Value,
    ) -> Result<DataSource> {
        let v = self
            .send_json(
                Method::POST,
                "/v1/data-sources",
                &json!({ "type": kind, "uri": uri, "metadata": metadata }),
            )
            .await?;
        self.cache.invalidate(&[Tag::DataSources]);
        Ok(serde_json::from_value(v)?)
    }

    pub async fn delete_data_source(&self, fqn: &str) -> Result<()> {
        // fqns contain slashes (e.g. web::https://...), so deletion is a POST
        // with the fqn in the body rather than a path segment.
        self.send_json(
            Method::POST,
            "/v1/data-sources/delete",
            &json!({ "data_source_fqn": fqn }),
        )
        .await?;
        self.cache.invalidate(&[Tag::DataSources]);
        Ok(())
    }

    // ============ Ingestion runs ============

    pub async fn trigger_ingestion(&self, collection: &str, fqn: &str) -> Result<IngestionRun> {
        let v = self
            .send_json(
                Method::POST,
                &format!("/v1/collections/{}/ingest", collection),
                &json!({ "data_source_fqn": fqn }),
            )
            .await?;
        self.cache
            .invalidate(&[Tag::IngestionRuns(collection.to_string())]);
        Ok(serde_json::from_value(v)?)
    }

    pub async fn list_ingestion_runs(&self, collection: &str) -> Result<Vec<IngestionRun>> {
        let key = format!("runs/{}", collection);
        if let Some(v) = self.cache.get(&key) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self
            .get_json(&format!("/v1/collections/{}/ingestion-runs", collection))
            .await?;
        let list: Vec<IngestionRun> = from_field(&v, "ingestion_runs")?;
        self.cache.put(
            key,
            vec![Tag::IngestionRuns(collection.to_string())],
            serde_json::to_value(&list)?,
        );
        Ok(list)
    }

    /// Current status of one run. Never cached — this is the polling path.
    pub async fn get_ingestion_run(&self, collection: &str, run: &str) -> Result<IngestionRun> {
        let v = self
            .get_json(&format!(
                "/v1/collections/{}/ingestion-runs/{}",
                collection, run
            ))
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    // ============ Chat models ============

    pub async fn list_chat_models(&self) -> Result<Vec<ChatModel>> {
        const KEY: &str = "chat-models";
        if let Some(v) = self.cache.get(KEY) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self.get_json("/v1/models?model_type=chat").await?;
        let list: Vec<ChatModel> = from_field(&v, "models")?;
        self.cache
            .put(KEY, vec![Tag::ChatModels], serde_json::to_value(&list)?);
        Ok(list)
    }

    // ============ RAG apps ============

    pub async fn list_apps(&self) -> Result<Vec<RagApp>> {
        const KEY: &str = "apps";
        if let Some(v) = self.cache.get(KEY) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self.get_json("/v1/apps").await?;
        let list: Vec<RagApp> = from_field(&v, "apps")?;
        let mut provides = vec![Tag::Apps];
        provides.extend(list.iter().map(|a| Tag::App(a.name.clone())));
        self.cache.put(KEY, provides, serde_json::to_value(&list)?);
        Ok(list)
    }

    pub async fn get_app(&self, name: &str) -> Result<RagApp> {
        let key = format!("apps/{}", name);
        if let Some(v) = self.cache.get(&key) {
            return Ok(serde_json::from_value(v)?);
        }
        let v = self.get_json(&format!("/v1/apps/{}", name)).await?;
        let app: RagApp = serde_json::from_value(v)?;
        self.cache.put(
            key,
            vec![Tag::App(name.to_string())],
            serde_json::to_value(&app)?,
        );
        Ok(app)
    }

    pub async fn create_app(&self, app: &RagApp) -> Result<RagApp> {
        let v = self
            .send_json(Method::POST, "/v1/apps", &serde_json::to_value(app)?)
            .await?;
        self.cache.invalidate(&[Tag::Apps]);
        Ok(serde_json::from_value(v)?)
    }

    pub async fn delete_app(&self, name: &str) -> Result<()> {
        self.send(
            self.request(Method::DELETE, &format!("/v1/apps/{}", name)),
            "/v1/apps",
        )
        .await?;
        self.cache
            .invalidate(&[Tag::Apps, Tag::App(name.to_string())]);
        Ok(())
    }

    // ============ Uploads ============

    /// Request signed upload slots for up to 50 paths under one upload
    /// directory. Returns `relative path → signed URL`.
    pub async fn request_upload_slots(
        &self,
        upload_name: &str,
        paths: &[String],
    ) -> Result<HashMap<String, String>> {
        if paths.len() > MAX_PATHS_PER_BATCH {
            bail!(
                "at most {} paths per slot request, got {}",
                MAX_PATHS_PER_BATCH,
                paths.len()
            );
        }
        let v = self
            .send_json(
                Method::POST,
                "/v1/uploads/batch",
                &json!({ "upload_name": upload_name, "paths": paths }),
            )
            .await?;
        let mut slots = HashMap::new();
        if let Some(urls) = v.get("upload_urls").and_then(|u| u.as_array()) {
            for slot in urls {
                if let (Some(path), Some(url)) = (
                    slot.get("path").and_then(|p| p.as_str()),
                    slot.get("signed_url").and_then(|u| u.as_str()),
                ) {
                    slots.insert(path.to_string(), url.to_string());
                }
            }
        }
        Ok(slots)
    }

    // ============ Streaming answers ============

    /// POST a query and consume the `text/event-stream` reply, invoking
    /// `on_event` for each decoded event as it arrives. Returns the
    /// accumulated answer once the stream closes (`end`, `error`, or EOF).
    pub async fn stream_answer<F>(
        &self,
        request: &AnswerRequest,
        mut on_event: F,
    ) -> Result<AnswerAccumulator>
    where
        F: FnMut(&AnswerEvent),
    {
        let resp = self
            .request(Method::POST, "/v1/answer")
            .json(request)
            .send()
            .await
            .context("answer request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("/v1/answer ({}): {}", status, extract_error_message(&body));
        }

        let mut parser = SseParser::new();
        let mut acc = AnswerAccumulator::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.context("answer stream interrupted")?;
            for frame in parser.feed(&bytes) {
                if let Some(event) = decode_event(&frame) {
                    on_event(&event);
                    if !acc.push(event) {
                        return Ok(acc);
                    }
                }
            }
        }
        Ok(acc)
    }
}

/// Pull a list out of `{ "<field>": [...] }`, tolerating a bare array reply.
fn from_field<T: serde::de::DeserializeOwned>(value: &Value, field: &str) -> Result<Vec<T>> {
    let inner = match value.get(field) {
        Some(v) => v.clone(),
        None if value.is_array() => value.clone(),
        None => Value::Array(Vec::new()),
    };
    Ok(serde_json::from_value(inner)?)
}

/// Best-effort human message from an error response body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = value.pointer("/detail/0/msg").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("detail").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = value.pointer("/error/message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty error response".to_string()
    } else {
        trimmed.to_string()
    }
}
