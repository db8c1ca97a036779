use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub query: QueryConfig,
    /// Only required for `dqa serve`.
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the QA Foundry API (e.g. `https://foundry.example.com`).
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    /// The client runs unauthenticated if the variable is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "QA_FOUNDRY_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Number of file paths per signed-slot request. The backend caps this at 50.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Ceiling on the total size of one upload set, in mebibytes.
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_file_mb: default_max_file_mb(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_max_file_mb() -> u64 {
    100
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Default chat model for `dqa ask`. Falls back to the backend's first
    /// enabled chat model when unset.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_retriever")]
    pub retriever: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: None,
            retriever: default_retriever(),
            top_k: default_top_k(),
        }
    }
}

fn default_retriever() -> String {
    "vectorstore".to_string()
}
fn default_top_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory holding the compiled SPA assets.
    pub static_dir: PathBuf,
    /// Upstream for `/api/svc` (the QA Foundry service API).
    pub svc_upstream: String,
    /// Upstream for `/api/ml` (model gateway).
    pub ml_upstream: String,
    /// Upstream for `/api/monitoring`.
    pub monitoring_upstream: String,
    /// Upstream for `/api/tfy-build`.
    pub build_upstream: String,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate backend
    if !config.backend.base_url.starts_with("http://")
        && !config.backend.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "backend.base_url must be an http(s) URL, got '{}'",
            config.backend.base_url
        );
    }
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    // Validate upload
    if config.upload.batch_size == 0 || config.upload.batch_size > 50 {
        anyhow::bail!(
            "upload.batch_size must be in 1..=50 (the slot endpoint rejects more), got {}",
            config.upload.batch_size
        );
    }
    if config.upload.max_file_mb == 0 {
        anyhow::bail!("upload.max_file_mb must be > 0");
    }

    // Validate query
    if config.query.top_k < 1 {
        anyhow::bail!("query.top_k must be >= 1");
    }

    Ok(config)
}
