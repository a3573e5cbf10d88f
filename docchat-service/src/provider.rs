//! Embedding and text-generation providers.
//!
//! Both capabilities sit behind traits so the pipeline and the responder do
//! not care whether they talk to the hosted Gemini API or a local Ollama
//! server.

mod gemini;
mod ollama;

#[cfg(test)]
pub(crate) mod fake;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::{EmbeddingsConfig, LlmConfig, LlmProviderKind};
use crate::error::ProviderError;

/// Longest provider error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Turns text into vectors. Documents and queries must use the same model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Embed a batch of document chunks, one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Generates a single non-streaming completion for a prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Whether the provider is reachable. Never fails.
    async fn health_check(&self) -> bool;
}

/// The provider pair used by the service
#[derive(Clone)]
pub struct Providers {
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub chat: Arc<dyn ChatModel>,
}

/// Build the configured providers.
///
/// Both capabilities come from the same backend; the embedding model is
/// configured separately from the generation model.
pub fn build_providers(
    llm: &LlmConfig,
    embeddings: &EmbeddingsConfig,
) -> Result<Providers, ProviderError> {
    let providers = match llm.provider {
        LlmProviderKind::Gemini => {
            let client = Arc::new(GeminiClient::new(llm, &embeddings.model)?);
            Providers {
                embeddings: client.clone(),
                chat: client,
            }
        }
        LlmProviderKind::Ollama => {
            let client = Arc::new(OllamaClient::new(llm, &embeddings.model)?);
            Providers {
                embeddings: client.clone(),
                chat: client,
            }
        }
    };

    info!(
        provider = ?llm.provider,
        endpoint = %llm.endpoint(),
        generation_model = providers.chat.model_name(),
        embedding_model = providers.embeddings.model_name(),
        "Configured model providers"
    );

    Ok(providers)
}

/// Send a request and decode a JSON body, mapping transport and status failures.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Connection {
            url: url.to_string(),
            source: e,
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        debug!(url, status = status.as_u16(), %message, "Provider request failed");

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Quota { message });
        }
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            message: e.to_string(),
        })
}

/// Pull a readable message out of a provider error body.
///
/// Understands `{"error": {"message": ...}}` and `{"error": "..."}`, falling
/// back to the raw (truncated) body.
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            let error = value.get("error")?;
            error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .map(str::to_string)
        });

    let message = parsed.unwrap_or_else(|| body.trim().to_string());
    if message.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = message.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", truncated)
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error": {"code": 400, "message": "API key not valid"}}"#),
            "API key not valid"
        );
        assert_eq!(
            error_message(r#"{"error": "model 'x' not found"}"#),
            "model 'x' not found"
        );
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");

        let long = "z".repeat(2000);
        assert_eq!(error_message(&long).chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let llm = crate::config::AppConfig::default().llm;
        let embeddings = crate::config::AppConfig::default().embeddings;
        assert!(llm.api_key.is_none());

        let result = build_providers(&llm, &embeddings);
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut llm = crate::config::AppConfig::default().llm;
        llm.provider = LlmProviderKind::Ollama;
        llm.generation_model = "llama3.2".to_string();
        let mut embeddings = crate::config::AppConfig::default().embeddings;
        embeddings.model = "nomic-embed-text".to_string();

        let providers = build_providers(&llm, &embeddings).unwrap();
        assert_eq!(providers.chat.model_name(), "llama3.2");
        assert_eq!(providers.embeddings.model_name(), "nomic-embed-text");
    }
}
