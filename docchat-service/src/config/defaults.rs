//! Default value functions for [`super::AppConfig`].

use std::path::PathBuf;

use super::{
    EmbeddingsConfig, LimitsConfig, LlmConfig, LlmProviderKind, RetrievalConfig, ServerConfig,
    StorageConfig, TaskBackend, TasksConfig,
};

// ==================== Section Defaults ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        keep_originals: default_keep_originals(),
        collection_ttl_secs: None,
    }
}

pub(crate) fn default_llm() -> LlmConfig {
    LlmConfig {
        provider: default_provider(),
        api_key: None,
        base_url: None,
        generation_model: default_generation_model(),
        temperature: default_temperature(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_embeddings() -> EmbeddingsConfig {
    EmbeddingsConfig {
        model: default_embedding_model(),
        chunk_size: default_chunk_size(),
        chunk_overlap: default_chunk_overlap(),
        batch_size: default_batch_size(),
    }
}

pub(crate) fn default_retrieval() -> RetrievalConfig {
    RetrievalConfig {
        top_k: default_top_k(),
        max_context_chars: default_max_context_chars(),
    }
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_document_size_bytes: default_max_document_size(),
    }
}

pub(crate) fn default_tasks() -> TasksConfig {
    TasksConfig {
        backend: default_task_backend(),
        retention_secs: default_task_retention_secs(),
        sweep_interval_secs: default_sweep_interval_secs(),
    }
}

// ==================== Server / Storage ====================

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8001
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_keep_originals() -> bool {
    true
}

// ==================== LLM ====================

pub(crate) fn default_provider() -> LlmProviderKind {
    LlmProviderKind::Gemini
}

pub(crate) fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

pub(crate) fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}

pub(crate) fn default_temperature() -> f32 {
    0.3
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    120
}

// ==================== Embeddings ====================

pub(crate) fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

pub(crate) fn default_chunk_size() -> usize {
    1000
}

pub(crate) fn default_chunk_overlap() -> usize {
    200
}

pub(crate) fn default_batch_size() -> usize {
    100
}

// ==================== Retrieval ====================

pub(crate) fn default_top_k() -> usize {
    5
}

pub(crate) fn default_max_context_chars() -> usize {
    4000
}

// ==================== Limits ====================

pub(crate) fn default_max_document_size() -> u64 {
    52_428_800 // 50MB
}

// ==================== Tasks ====================

pub(crate) fn default_task_backend() -> TaskBackend {
    TaskBackend::Memory
}

pub(crate) fn default_task_retention_secs() -> u64 {
    86_400
}

pub(crate) fn default_sweep_interval_secs() -> u64 {
    300
}
