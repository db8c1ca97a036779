//! Wire types mirrored from the QA Foundry backend.
//!
//! These are display-oriented mirrors of server state — the client owns none
//! of their lifecycle. Fields the backend may omit carry serde defaults so a
//! newer server never breaks an older CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Embedding configuration attached to a collection at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
}

/// A data source linked to a collection, with its parser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatedDataSource {
    pub data_source_fqn: String,
    #[serde(default)]
    pub parser_config: Value,
}

/// A named group of ingested documents sharing an embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub embedder_config: EmbedderConfig,
    #[serde(default)]
    pub associated_data_sources: Vec<AssociatedDataSource>,
}

/// Kind of data source the backend can ingest from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceType {
    /// A directory of uploaded files.
    Localdir,
    /// A crawled web page or site.
    Web,
    /// A structured database.
    Structured,
    /// A TrueFoundry-managed artifact.
    Truefoundry,
}

impl std::fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataSourceType::Localdir => "localdir",
            DataSourceType::Web => "web",
            DataSourceType::Structured => "structured",
            DataSourceType::Truefoundry => "truefoundry",
        };
        f.write_str(s)
    }
}

/// A registered document set that collections can link and synchronize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    /// Fully qualified name assigned by the backend (e.g. `localdir::upload-1234`).
    pub fqn: String,
    #[serde(rename = "type")]
    pub kind: DataSourceType,
    pub uri: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Lifecycle of one synchronization attempt between a source and a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestionStatus {
    Initialized,
    Running,
    Completed,
    Failed,
    /// Any status this client version does not know about.
    #[serde(other)]
    Unknown,
}

impl IngestionStatus {
    /// Terminal states — polling can stop here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IngestionStatus::Initialized => "INITIALIZED",
            IngestionStatus::Running => "RUNNING",
            IngestionStatus::Completed => "COMPLETED",
            IngestionStatus::Failed => "FAILED",
            IngestionStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Record of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub name: String,
    pub collection_name: String,
    pub data_source_fqn: String,
    pub status: IngestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A chat model enabled on the backend's model gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Saved configuration of collection + model + retriever + prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAppConfig {
    pub collection_name: String,
    pub model_name: String,
    pub retriever_name: String,
    #[serde(default)]
    pub retriever_config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// An embeddable RAG application record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagApp {
    pub name: String,
    pub config: RagAppConfig,
}

/// Model selection inside an [`AnswerRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfiguration {
    pub name: String,
}

/// Body of the streaming query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub collection_name: String,
    pub query: String,
    pub model_configuration: ModelConfiguration,
    pub retriever_name: String,
    #[serde(default)]
    pub retriever_config: Value,
    pub stream: bool,
}

/// One retrieved document returned alongside a streamed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDoc {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Value,
}
