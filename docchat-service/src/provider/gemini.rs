//! Google Gemini REST client (`generativelanguage.googleapis.com`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ChatModel, EmbeddingProvider, send_json};
use crate::config::LlmConfig;
use crate::error::ProviderError;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API client serving both generation and embeddings
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    generation_model: String,
    embedding_model: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, embedding_model: &str) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey {
                provider: "gemini".to_string(),
            })?;

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
            api_key,
            generation_model: config.generation_model.clone(),
            embedding_model: embedding_model.to_string(),
            temperature: config.temperature,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn embed_request<'a>(&'a self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.model_url(&self.embedding_model, "batchEmbedContents");
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.embed_request(text, "RETRIEVAL_DOCUMENT"))
                .collect(),
        };

        let response: BatchEmbedResponse = send_json(
            self.client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&request),
            &url,
        )
        .await?;

        if response.embeddings.len() != texts.len() {
            return Err(ProviderError::InvalidResponse {
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            });
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = self.model_url(&self.embedding_model, "embedContent");
        let response: EmbedContentResponse = send_json(
            self.client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&self.embed_request(text, "RETRIEVAL_QUERY")),
            &url,
        )
        .await?;

        if response.embedding.values.is_empty() {
            return Err(ProviderError::InvalidResponse {
                message: "empty query embedding".to_string(),
            });
        }
        Ok(response.embedding.values)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.generation_model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = self.model_url(&self.generation_model, "generateContent");
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let response: GenerateContentResponse = send_json(
            self.client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(&request),
            &url,
        )
        .await?;

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            warn!(reason, "Gemini blocked the prompt");
        }

        // A blocked or empty candidate yields empty text; the caller decides the fallback
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models/{}", self.base_url, self.generation_model);
        match self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Gemini health check failed");
                false
            }
        }
    }
}

// ==================== Wire types ====================

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::provider::fake::serve;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    fn client_for(base_url: String) -> GeminiClient {
        let mut llm = AppConfig::default().llm;
        llm.api_key = Some("test-key".to_string());
        llm.base_url = Some(base_url);
        GeminiClient::new(&llm, "text-embedding-004").unwrap()
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let router = Router::new().route(
            "/models/{action}",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get(API_KEY_HEADER).unwrap(), "test-key");
                assert_eq!(body["contents"][0]["parts"][0]["text"], "Say hi");
                Json(json!({
                    "candidates": [{"content": {"parts": [{"text": "Hi"}, {"text": " there"}]}}]
                }))
            }),
        );
        let client = client_for(serve(router).await);

        assert_eq!(client.generate("Say hi").await.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn test_blocked_prompt_returns_empty_text() {
        let router = Router::new().route(
            "/models/{action}",
            post(|| async { Json(json!({"promptFeedback": {"blockReason": "SAFETY"}})) }),
        );
        let client = client_for(serve(router).await);

        assert_eq!(client.generate("anything").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_batch_embeddings_keep_order() {
        let router = Router::new().route(
            "/models/{action}",
            post(|Json(body): Json<Value>| async move {
                let embeddings: Vec<Value> = body["requests"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|r| {
                        assert_eq!(r["taskType"], "RETRIEVAL_DOCUMENT");
                        let len = r["content"]["parts"][0]["text"].as_str().unwrap().len();
                        json!({"values": [len as f32, 1.0]})
                    })
                    .collect();
                Json(json!({ "embeddings": embeddings }))
            }),
        );
        let client = client_for(serve(router).await);

        let vectors = client
            .embed_documents(&["a".to_string(), "abc".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_quota_and_api_errors() {
        let router = Router::new().route(
            "/models/{action}",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": {"message": "Resource has been exhausted"}})),
                )
            })
            .get(|| async { StatusCode::FORBIDDEN }),
        );
        let client = client_for(serve(router).await);

        let err = client.generate("q").await.unwrap_err();
        assert!(
            matches!(err, ProviderError::Quota { ref message } if message == "Resource has been exhausted")
        );
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_unreachable_is_connection_error() {
        let client = client_for("http://127.0.0.1:9".to_string());
        let err = client.embed_query("q").await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection { .. }));
    }
}
