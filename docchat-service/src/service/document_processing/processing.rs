//! Background indexing pipeline for one upload.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use super::progress::{checkpoints, embedding_progress};
use crate::db::NewChunk;
use crate::error::{
    IndexingError, ProcessingError, ProviderError, ServiceError, ServiceResult,
    format_error_chain,
};
use crate::ingestion::extract_document;
use crate::service::DocChatService;
use crate::tasks::{TaskStatus, TaskUpdate};
use crate::telemetry;

/// Everything the background worker needs to index one upload
pub(crate) struct UploadJob {
    pub task_id: String,
    pub collection_name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl DocChatService {
    /// Run the pipeline to a terminal task state. Never returns an error;
    /// failures end up on the task.
    pub(crate) async fn run_upload_job(self: Arc<Self>, job: UploadJob) {
        let started = Instant::now();
        let task_id = job.task_id.clone();
        let collection_name = job.collection_name.clone();
        let filename = job.filename.clone();

        info!(task_id = %task_id, collection = %collection_name, "Starting document processing");

        match self.index_document(job).await {
            Ok(chunk_count) => {
                let message = format!(
                    "Successfully processed '{}' into {} chunks.",
                    filename, chunk_count
                );
                let completed = self
                    .report_progress(
                        &task_id,
                        TaskUpdate::new(TaskStatus::Completed, message, 100),
                    )
                    .await;

                if let Err(e) = completed {
                    // A collection must never outlive a task that cannot say it is ready
                    error!(
                        task_id = %task_id,
                        error = %format_error_chain(&e),
                        "Failed to mark task completed, discarding collection"
                    );
                    if let Err(e) = self.db.delete_collection(&collection_name) {
                        warn!(collection = %collection_name, error = %e, "Failed to discard collection");
                    }
                    self.remove_originals(&collection_name).await;
                    metrics::counter!(telemetry::TASKS_FAILED_TOTAL).increment(1);
                    return;
                }

                let elapsed = started.elapsed();
                metrics::counter!(telemetry::TASKS_COMPLETED_TOTAL).increment(1);
                metrics::histogram!(telemetry::INDEXING_SECONDS).record(elapsed.as_secs_f64());
                info!(
                    task_id = %task_id,
                    collection = %collection_name,
                    chunks = chunk_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Document processing complete"
                );
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    collection = %collection_name,
                    error = %format_error_chain(&e),
                    "Document processing failed"
                );
                metrics::counter!(telemetry::TASKS_FAILED_TOTAL).increment(1);

                self.remove_originals(&collection_name).await;

                let message = format!("Failed to process '{}': {}", filename, e.user_message());
                if let Err(e) = self
                    .report_progress(&task_id, TaskUpdate::failed(message))
                    .await
                {
                    error!(task_id = %task_id, error = %e, "Failed to record task failure");
                }
            }
        }
    }

    /// Save, extract, split, embed and store. Returns the chunk count.
    async fn index_document(&self, job: UploadJob) -> ServiceResult<usize> {
        let UploadJob {
            task_id,
            collection_name,
            filename,
            content_type,
            content,
        } = job;

        // Step 1: keep the original
        self.report_progress(
            &task_id,
            TaskUpdate::new(
                TaskStatus::Uploading,
                format!("Saving '{}'...", filename),
                checkpoints::SAVING,
            ),
        )
        .await?;

        if self.config.storage.keep_originals {
            self.save_original(&collection_name, &filename, &content)
                .await?;
        }

        // Step 2: extract text off the async runtime
        self.report_processing(&task_id, "Extracting text...", checkpoints::EXTRACTING)
            .await?;

        let max_bytes = self.config.limits.max_document_size_bytes;
        let extract_name = filename.clone();
        let document = tokio::task::spawn_blocking(move || {
            extract_document(&content, &extract_name, content_type.as_deref(), max_bytes)
        })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Extraction task panicked: {}", e),
        })??;

        debug!(
            task_id = %task_id,
            format = document.format.as_str(),
            segments = document.segments.len(),
            chars = document.char_count(),
            "Text extracted"
        );

        // Step 3: split
        self.report_processing(
            &task_id,
            "Splitting text into chunks...",
            checkpoints::CHUNKING,
        )
        .await?;

        let chunks = self.splitter().split_segments(&document.segments);
        if chunks.is_empty() {
            return Err(ProcessingError::ExtractionFailed {
                message: "The document produced no text chunks.".to_string(),
            }
            .into());
        }

        // Step 4: embed batch by batch
        let batch_size = self.config.embeddings.batch_size.max(1);
        let batch_count = chunks.len().div_ceil(batch_size);
        let mut rows = Vec::with_capacity(chunks.len());

        for (batch_id, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self
                .providers
                .embeddings
                .embed_documents(&texts)
                .await
                .map_err(IndexingError::Embedding)?;

            if embeddings.len() != batch.len() {
                return Err(IndexingError::Embedding(ProviderError::InvalidResponse {
                    message: format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                })
                .into());
            }

            rows.extend(batch.iter().zip(embeddings).map(|(chunk, embedding)| NewChunk {
                content: chunk.content.clone(),
                chunk_index: chunk.chunk_index,
                batch_id,
                page_number: chunk.page_number,
                section_title: chunk.section_title.clone(),
                char_offset: chunk.char_offset,
                embedding,
            }));

            self.report_processing(
                &task_id,
                format!("Embedding chunks ({}/{})...", batch_id + 1, batch_count),
                embedding_progress(batch_id + 1, batch_count),
            )
            .await?;
        }

        // Step 5: write the collection atomically
        self.report_processing(&task_id, "Writing to vector store...", checkpoints::STORING)
            .await?;

        let db = self.db.clone();
        let model = self.providers.embeddings.model_name().to_string();
        let store_name = collection_name.clone();
        let collection = tokio::task::spawn_blocking(move || {
            db.create_collection_with_chunks(&store_name, &filename, &model, &rows)
        })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Vector store task panicked: {}", e),
        })?
        .map_err(|e| IndexingError::Store {
            message: format_error_chain(&e),
        })?;

        Ok(collection.chunk_count)
    }

    async fn save_original(
        &self,
        collection_name: &str,
        filename: &str,
        content: &[u8],
    ) -> ServiceResult<()> {
        let dir = self.originals_dir(collection_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(ProcessingError::Io)?;
        tokio::fs::write(dir.join(filename), content)
            .await
            .map_err(ProcessingError::Io)?;
        debug!(path = %dir.display(), "Saved original upload");
        Ok(())
    }
}
