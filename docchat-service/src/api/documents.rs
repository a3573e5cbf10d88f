//! Document upload and task status endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use bytes::BytesMut;
use futures::Stream;
use serde::Serialize;
use tokio_stream::StreamExt as _;
use tracing::warn;

use crate::error::{ProcessingError, ServiceError};
use crate::tasks::{TaskState, TaskStatus};

use super::AppState;

/// Response for an accepted upload
#[derive(Serialize)]
pub struct UploadResponse {
    pub task_id: String,
    pub message: String,
}

/// Task status as seen by clients
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub progress: u8,
    /// Present once the task has completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

impl From<&TaskState> for StatusResponse {
    fn from(state: &TaskState) -> Self {
        Self {
            task_id: state.task_id.clone(),
            status: state.status,
            message: state.message.clone(),
            progress: state.progress,
            collection_name: state.ready_collection().map(str::to_string),
        }
    }
}

/// Accept a multipart `file` field and queue it for indexing.
///
/// The body is read chunk by chunk so an oversize upload is rejected as soon
/// as it crosses the limit, before any task exists.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServiceError> {
    let max = state.service.config.limits.max_document_size_bytes;
    let body_limit = max.saturating_add(super::MULTIPART_OVERHEAD_BYTES as u64);
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            warn!(error = %e.body_text(), "Upload exceeded request body limit");
            // The body crossed the request limit, so the file is at least that large
            return ServiceError::from(ProcessingError::FileTooLarge {
                size: body_limit,
                max,
            });
        }
        ServiceError::InvalidRequest {
            message: e.body_text(),
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut content = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            let size = (content.len() + chunk.len()) as u64;
            if size > max {
                return Err(ProcessingError::FileTooLarge { size, max }.into());
            }
            content.extend_from_slice(&chunk);
        }

        let task = state
            .service
            .submit_upload(&filename, content_type.as_deref(), content.freeze())
            .await?;

        return Ok(Json(UploadResponse {
            task_id: task.task_id,
            message: format!("File '{}' upload started.", task.filename),
        }));
    }

    Err(ServiceError::InvalidRequest {
        message: "No file was provided. Send it in the 'file' form field.".to_string(),
    })
}

/// Current state of an upload task
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusResponse>, ServiceError> {
    let task = state.service.task_status(&task_id).await?;
    Ok(Json(StatusResponse::from(&task)))
}

/// Server-sent `status` events for one task, closed after the terminal state
pub async fn status_events_handler(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let updates = state.service.task_event_stream(&task_id).await?;

    let events = updates.map(|task| {
        let payload = StatusResponse::from(&task);
        Ok(Event::default()
            .event("status")
            .json_data(&payload)
            .unwrap_or_else(|_| Event::default().event("status").data(task.status.as_str())))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::api::test_support::*;
    use crate::ingestion::sample_pdf;
    use crate::provider::fake::{FakeEmbedder, FakeProviders};
    use crate::service::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pdf_upload_to_chat_end_to_end() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let pdf = sample_pdf(&[
            "Lighthouses guide ships along dangerous coasts.",
            "Keepers trim the lamp wick every evening.",
        ]);
        let response = send(&app, upload_request("coast.pdf", "application/pdf", &pdf)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "File 'coast.pdf' upload started.");
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let status = poll_until_terminal(&app, &task_id).await;
        assert_eq!(status["status"], "completed", "{status}");
        assert_eq!(status["progress"], 100);
        let collection = status["collection_name"].as_str().unwrap().to_string();

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/chat",
                json!({"query": "What is this document about?", "collection_name": collection}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(!body["response"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_pdf_fails_with_message() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let response = send(
            &app,
            upload_request("broken.pdf", "application/pdf", b"not a pdf at all"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let task_id = body_json(response).await["task_id"]
            .as_str()
            .unwrap()
            .to_string();

        let status = poll_until_terminal(&app, &task_id).await;
        assert_eq!(status["status"], "failed");
        assert!(!status["message"].as_str().unwrap().is_empty());
        assert!(status.get("collection_name").is_none());
    }

    #[tokio::test]
    async fn test_oversize_upload_is_413_without_task() {
        let t = test_service_with(FakeProviders::new(), |c| {
            c.limits.max_document_size_bytes = 32
        });
        let app = router(t.service.clone(), None);

        let response = send(&app, upload_request("big.txt", "text/plain", &[b'x'; 64])).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "file_too_large");
        assert!(t.task_table.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_type_is_400() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let response = send(&app, upload_request("photo.png", "image/png", b"\x89PNG")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "unsupported_format");
        assert!(t.task_table.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_field_is_400() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let body = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n");
        let request = axum::http::Request::post("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let response = send(&app, get_request("/api/status/does-not-exist")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "task_not_found");

        let response = send(&app, get_request("/api/status/does-not-exist/events")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_two_uploads_are_isolated() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let first = body_json(
            send(
                &app,
                upload_request("a.txt", "text/plain", b"Lighthouses guide ships at night."),
            )
            .await,
        )
        .await;
        let second = body_json(
            send(
                &app,
                upload_request("b.md", "text/markdown", b"# Bread\n\nKnead the dough twice."),
            )
            .await,
        )
        .await;
        assert_ne!(first["task_id"], second["task_id"]);

        let a = poll_until_terminal(&app, first["task_id"].as_str().unwrap()).await;
        let b = poll_until_terminal(&app, second["task_id"].as_str().unwrap()).await;
        assert_eq!(a["status"], "completed");
        assert_eq!(b["status"], "completed");
        assert_ne!(a["collection_name"], b["collection_name"]);

        send(
            &app,
            json_request(
                "POST",
                "/api/chat",
                json!({"query": "dough", "collection_name": a["collection_name"]}),
            ),
        )
        .await;
        let prompt = t.fakes.chat.last_prompt().unwrap();
        assert!(prompt.contains("Lighthouses guide ships"));
        assert!(!prompt.contains("Knead the dough"));
    }

    #[tokio::test]
    async fn test_status_hides_collection_until_completed() {
        let (embedder, gate) = FakeEmbedder::gated();
        let t = test_service_with(FakeProviders::with_embedder(embedder), |_| {});
        let app = router(t.service.clone(), None);

        let body = body_json(
            send(&app, upload_request("guide.txt", "text/plain", lighthouse_text().as_bytes()))
                .await,
        )
        .await;
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let status = body_json(send(&app, get_request(&format!("/api/status/{task_id}"))).await).await;
        assert_ne!(status["status"], "completed");
        assert!(status.get("collection_name").is_none());

        gate.add_permits(1000);
        let status = poll_until_terminal(&app, &task_id).await;
        assert!(status["collection_name"].as_str().unwrap().starts_with("doc_"));
    }

    #[tokio::test]
    async fn test_status_events_stream_ends_at_terminal_state() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let body = body_json(
            send(&app, upload_request("guide.txt", "text/plain", lighthouse_text().as_bytes()))
                .await,
        )
        .await;
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let response = send(&app, get_request(&format!("/api/status/{task_id}/events"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let text = tokio::time::timeout(std::time::Duration::from_secs(5), body_text(response))
            .await
            .unwrap();
        assert!(text.contains("event: status"));
        assert!(text.contains("\"status\":\"completed\""));
        assert_eq!(text.matches("\"status\":\"completed\"").count(), 1);
    }
}
