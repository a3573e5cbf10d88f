//! Retrieval-augmented answers over a single collection.

use tracing::{debug, info, warn};

use crate::db::ScoredChunk;
use crate::error::{ServiceError, ServiceResult};
use crate::service::DocChatService;
use crate::tasks::TaskStatus;
use crate::telemetry;

const ANSWER_TEMPLATE: &str = include_str!("../../prompts/answer.txt");

const CHUNK_SEPARATOR: &str = "\n\n---\n\n";
const NO_CONTEXT: &str = "No relevant text was found in the document.";
const EMPTY_ANSWER: &str =
    "I'm sorry, I couldn't generate a response. Please try rephrasing your question.";

impl DocChatService {
    /// Answer `query` from the chunks of one completed collection.
    pub async fn chat(&self, query: &str, collection_name: &str) -> ServiceResult<String> {
        let query = query.trim();
        let collection_name = collection_name.trim();
        if query.is_empty() || collection_name.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Both a query and a collection name are required.".to_string(),
            });
        }

        metrics::counter!(telemetry::CHAT_REQUESTS_TOTAL).increment(1);
        self.ensure_collection_ready(collection_name).await?;

        let result = self.answer(query, collection_name).await;
        if result.is_err() {
            metrics::counter!(telemetry::CHAT_FAILURES_TOTAL).increment(1);
        }
        result
    }

    /// A tracked task must have completed. An untracked collection must exist.
    async fn ensure_collection_ready(&self, collection_name: &str) -> ServiceResult<()> {
        if let Some(task) = self.tasks.find_by_collection(collection_name).await? {
            if task.status == TaskStatus::Completed {
                return Ok(());
            }
            return Err(ServiceError::CollectionNotReady {
                collection_name: collection_name.to_string(),
                status: task.status.to_string(),
            });
        }

        if self.db.collection_exists(collection_name)? {
            Ok(())
        } else {
            Err(ServiceError::CollectionNotFound {
                collection_name: collection_name.to_string(),
            })
        }
    }

    async fn answer(&self, query: &str, collection_name: &str) -> ServiceResult<String> {
        let query_embedding = self.providers.embeddings.embed_query(query).await?;

        let db = self.db.clone();
        let search_name = collection_name.to_string();
        let top_k = self.config.retrieval.top_k;
        let chunks = tokio::task::spawn_blocking(move || {
            db.search_chunks(&search_name, &query_embedding, top_k)
        })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Chunk search task panicked: {}", e),
        })??;
        debug!(
            collection = %collection_name,
            hits = chunks.len(),
            top_similarity = chunks.first().map(|c| c.similarity),
            "Retrieved context"
        );

        let context = build_context(&chunks, self.config.retrieval.max_context_chars);
        let prompt = render_prompt(query, &context);

        let response = self.providers.chat.generate(&prompt).await?;
        let response = response.trim();

        if response.is_empty() {
            warn!(collection = %collection_name, "Model returned an empty answer");
            return Ok(EMPTY_ANSWER.to_string());
        }

        info!(
            collection = %collection_name,
            chunks = chunks.len(),
            answer_chars = response.len(),
            "Answered chat query"
        );
        Ok(response.to_string())
    }
}

/// Join retrieved chunks, cut to at most `max_chars` characters plus `...`.
fn build_context(chunks: &[ScoredChunk], max_chars: usize) -> String {
    let joined = chunks
        .iter()
        .map(|c| c.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    match joined.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &joined[..cut]),
        None => joined,
    }
}

/// Fill the answer template. Placeholders inside `query` are left alone.
fn render_prompt(query: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    };

    match ANSWER_TEMPLATE.split_once("{context}") {
        Some((head, tail)) => format!(
            "{}{}{}",
            head.replace("{question}", query),
            context,
            tail.replace("{question}", query)
        ),
        None => ANSWER_TEMPLATE.replace("{question}", query),
    }
}
