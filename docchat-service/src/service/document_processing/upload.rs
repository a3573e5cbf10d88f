//! Upload intake.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use uuid::Uuid;

use super::UploadJob;
use crate::error::{ProcessingError, ServiceError, ServiceResult};
use crate::ingestion::DocumentFormat;
use crate::service::DocChatService;
use crate::tasks::TaskState;
use crate::telemetry;

impl DocChatService {
    /// Accept an upload and start indexing it in the background.
    ///
    /// Size and format are checked before any task exists, so a rejected
    /// upload leaves no trace. On success the returned task is `queued` and
    /// owns a freshly reserved collection name.
    pub async fn submit_upload(
        self: &Arc<Self>,
        filename: &str,
        content_type: Option<&str>,
        content: Bytes,
    ) -> ServiceResult<TaskState> {
        let filename = sanitize_filename(filename).ok_or_else(|| ServiceError::InvalidRequest {
            message: "A file with a name is required.".to_string(),
        })?;

        let max = self.config.limits.max_document_size_bytes;
        let size = content.len() as u64;
        if size > max {
            return Err(ProcessingError::FileTooLarge { size, max }.into());
        }

        let format = DocumentFormat::detect(&filename, content_type)?;
        let collection_name = self.reserve_collection_name().await?;
        let task = self.tasks.create(&filename, &collection_name).await?;

        metrics::counter!(telemetry::UPLOADS_TOTAL, "format" => format.as_str()).increment(1);
        self.events.publish(&task);

        info!(
            task_id = %task.task_id,
            collection = %collection_name,
            filename = %filename,
            format = format.as_str(),
            size,
            "Upload queued for processing"
        );

        let job = UploadJob {
            task_id: task.task_id.clone(),
            collection_name,
            filename,
            content_type: content_type.map(str::to_string),
            content,
        };

        let service = self.clone();
        tokio::spawn(async move {
            service.run_upload_job(job).await;
        });

        Ok(task)
    }

    /// Draw `doc_` + 8 hex chars until the name is unused by both the
    /// vector store and the task table.
    async fn reserve_collection_name(&self) -> ServiceResult<String> {
        loop {
            let simple = Uuid::new_v4().simple().to_string();
            let candidate = format!("doc_{}", &simple[..8]);

            if self.db.collection_exists(&candidate)?
                || self.tasks.collection_reserved(&candidate).await?
            {
                debug!(collection = %candidate, "Collection name taken, drawing another");
                continue;
            }
            return Ok(candidate);
        }
    }
}

/// Reduce a client-supplied filename to its last path component.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name: String = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let name = name.trim();

    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
