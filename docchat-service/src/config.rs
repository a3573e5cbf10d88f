//! Service configuration.
//!
//! All settings are read once at startup from an optional `config` file and
//! `DOCCHAT__SECTION__KEY` environment variables (see [`loader`]).

mod defaults;
mod loader;

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub use loader::load_config;

use defaults::*;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_llm")]
    pub llm: LlmConfig,

    #[serde(default = "default_embeddings")]
    pub embeddings: EmbeddingsConfig,

    #[serde(default = "default_retrieval")]
    pub retrieval: RetrievalConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_tasks")]
    pub tasks: TasksConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite database and stored originals.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep a copy of every uploaded file under `data_dir/documents`.
    #[serde(default = "default_keep_originals")]
    pub keep_originals: bool,

    /// Delete collections older than this. `None` keeps them forever.
    #[serde(default)]
    pub collection_ttl_secs: Option<u64>,
}

/// Which hosted model API to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    Gemini,
    Ollama,
}

/// Language model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProviderKind,

    /// API key for hosted providers. Falls back to `GOOGLE_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Override the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Endpoint to use, honouring an explicit override.
    pub fn endpoint(&self) -> String {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProviderKind::Gemini) => default_gemini_url(),
            (None, LlmProviderKind::Ollama) => default_ollama_url(),
        }
    }
}

/// Embedding and chunking configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Chunks embedded per provider call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Retrieval configuration for chat
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

/// Size and format limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,
}

/// Where task state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskBackend {
    Memory,
    Sqlite,
}

/// Task tracking configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_task_backend")]
    pub backend: TaskBackend,

    /// Terminal tasks are evicted this long after their last update.
    #[serde(default = "default_task_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl TasksConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            llm: default_llm(),
            embeddings: default_embeddings(),
            retrieval: default_retrieval(),
            limits: default_limits(),
            tasks: default_tasks(),
        }
    }
}

impl AppConfig {
    /// Reject combinations that would break chunking or retrieval.
    pub fn validate(&self) -> Result<(), String> {
        let e = &self.embeddings;
        if e.chunk_size == 0 {
            return Err("embeddings.chunk_size must be greater than 0".to_string());
        }
        if e.chunk_overlap >= e.chunk_size {
            return Err(format!(
                "embeddings.chunk_overlap ({}) must be smaller than embeddings.chunk_size ({})",
                e.chunk_overlap, e.chunk_size
            ));
        }
        if e.batch_size == 0 {
            return Err("embeddings.batch_size must be greater than 0".to_string());
        }
        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be greater than 0".to_string());
        }
        if self.limits.max_document_size_bytes == 0 {
            return Err("limits.max_document_size_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}
