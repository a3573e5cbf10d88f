//! Ollama client for self-hosted models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ChatModel, EmbeddingProvider, send_json};
use crate::config::LlmConfig;
use crate::error::ProviderError;

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    generation_model: String,
    embedding_model: String,
    temperature: f32,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig, embedding_model: &str) -> Result<Self, ProviderError> {
        let base_url = config.endpoint();
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::Connection {
                url: base_url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            base_url,
            generation_model: config.generation_model.clone(),
            embedding_model: embedding_model.to_string(),
            temperature: config.temperature,
        })
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response: EmbeddingsResponse =
            send_json(self.client.post(&url).json(&request), &url).await?;

        if response.embedding.is_empty() {
            return Err(ProviderError::InvalidResponse {
                message: "empty embedding".to_string(),
            });
        }
        Ok(response.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_one(text).await
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.generation_model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.generation_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response: ChatResponse =
            send_json(self.client.post(&url).json(&request), &url).await?;

        Ok(response.message.map(|m| m.content).unwrap_or_default())
    }

    /// Check if Ollama is available
    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, LlmProviderKind};
    use crate::provider::fake::serve;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    fn client_for(base_url: String) -> OllamaClient {
        let mut llm = AppConfig::default().llm;
        llm.provider = LlmProviderKind::Ollama;
        llm.generation_model = "llama3.2".to_string();
        llm.base_url = Some(base_url);
        OllamaClient::new(&llm, "nomic-embed-text").unwrap()
    }

    #[tokio::test]
    async fn test_chat_is_non_streaming() {
        let router = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                assert_eq!(body["model"], "llama3.2");
                Json(json!({"message": {"role": "assistant", "content": "Pong"}, "done": true}))
            }),
        );
        let client = client_for(serve(router).await);
        assert_eq!(client.generate("Ping").await.unwrap(), "Pong");
    }

    #[tokio::test]
    async fn test_embeddings_one_request_per_text() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|Json(body): Json<Value>| async move {
                let len = body["prompt"].as_str().unwrap().len() as f32;
                Json(json!({ "embedding": [len, 0.5] }))
            }),
        );
        let client = client_for(serve(router).await);

        let vectors = client
            .embed_documents(&["ab".to_string(), "abcd".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![2.0, 0.5], vec![4.0, 0.5]]);
    }

    #[tokio::test]
    async fn test_missing_model_is_api_error() {
        let router = Router::new()
            .route(
                "/api/chat",
                post(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({"error": "model 'llama3.2' not found"})),
                    )
                }),
            )
            .route("/api/tags", get(|| async { Json(json!({"models": []})) }));
        let client = client_for(serve(router).await);

        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 404, .. }));
        assert!(client.health_check().await);
    }
}
