use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use crate::pipeline::{ChunkConfig, PipelineConfig};

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: "text-embedding-ada-002".to_string(),
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    /// RAG only runs when endpoint, key and model are all set.
    pub fn is_configured(&self) -> bool {
        [&self.endpoint, &self.api_key, &self.model]
            .iter()
            .all(|value| !value.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_concurrent_documents: usize,
    pub request_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            chunk_size: pipeline.chunk.chunk_size,
            chunk_overlap: pipeline.chunk.overlap,
            top_k: pipeline.top_k,
            max_concurrent_documents: pipeline.max_concurrent_documents,
            request_timeout_secs: 120,
        }
    }
}

impl RagConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunk: ChunkConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            top_k: self.top_k,
            max_concurrent_documents: self.max_concurrent_documents,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl AppConfig {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Failed to parse configuration YAML")
    }

    /// Applies `EMBEDDING_*` and `RAG_*` overrides. `lookup` resolves a
    /// variable name, normally to `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(endpoint) = get("EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = endpoint;
        }
        if let Some(api_key) = get("EMBEDDING_API_KEY") {
            self.embedding.api_key = api_key;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(value) = get("EMBEDDING_TIMEOUT") {
            self.embedding.timeout_secs = parse_var("EMBEDDING_TIMEOUT", &value)?;
        }
        if let Some(value) = get("RAG_CHUNK_SIZE") {
            self.rag.chunk_size = parse_var("RAG_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = get("RAG_CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_var("RAG_CHUNK_OVERLAP", &value)?;
        }
        if let Some(value) = get("RAG_TOP_K") {
            self.rag.top_k = parse_var("RAG_TOP_K", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rag.chunk_size == 0 {
            bail!("rag.chunk_size must be greater than 0");
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            bail!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap,
                self.rag.chunk_size
            );
        }
        if self.rag.top_k == 0 {
            bail!("rag.top_k must be greater than 0");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid value for {name}: '{value}'"))
}

pub async fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()).await
}

/// Reads the YAML file, applies environment overrides and validates.
pub async fn load_config_from(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let mut config = AppConfig::from_yaml(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    config.apply_env_overrides(|name| env::var(name).ok())?;
    config.validate()?;
    info!(path = %path.display(), "Configuration loaded from disk");
    if !config.embedding.is_configured() {
        warn!("Embedding endpoint, API key or model missing; RAG will be skipped");
    }
    Ok(config)
}

pub fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
