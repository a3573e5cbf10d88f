//! Collection listing and deletion endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ErrorResponse, ServiceError};

use super::AppState;

#[derive(Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Names of all indexed collections, newest first
pub async fn list_collections_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CollectionsResponse>, ServiceError> {
    let collections = state
        .service
        .list_collections()?
        .into_iter()
        .map(|c| c.name)
        .collect();
    Ok(Json(CollectionsResponse { collections }))
}

/// Delete a collection with its chunks, stored original and task record
pub async fn delete_collection_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, Response> {
    match state.service.delete_collection(&name).await {
        Ok(()) => Ok(Json(DeleteResponse {
            message: format!("Collection '{}' deleted successfully", name),
        })),
        // Chat reports unknown collections as 400; a missing delete target is a 404
        Err(e @ ServiceError::CollectionNotFound { .. }) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                message: e.user_message(),
                code: Some(e.error_code().to_string()),
            }),
        )
            .into_response()),
        Err(e) => Err(e.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::test_support::*;
    use crate::service::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_and_delete_collections() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let body = body_json(send(&app, get_request("/api/collections")).await).await;
        assert_eq!(body, json!({"collections": []}));

        let upload = body_json(
            send(&app, upload_request("guide.txt", "text/plain", lighthouse_text().as_bytes()))
                .await,
        )
        .await;
        let task_id = upload["task_id"].as_str().unwrap().to_string();
        let status = poll_until_terminal(&app, &task_id).await;
        let name = status["collection_name"].as_str().unwrap().to_string();

        let body = body_json(send(&app, get_request("/api/collections")).await).await;
        assert_eq!(body, json!({ "collections": [name.clone()] }));

        let response = send(
            &app,
            json_request("DELETE", &format!("/api/collections/{name}"), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            format!("Collection '{name}' deleted successfully")
        );

        let response = send(&app, get_request(&format!("/api/status/{task_id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &app,
            json_request(
                "POST",
                "/api/chat",
                json!({"query": "Who keeps the light?", "collection_name": name}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_collection_is_404() {
        let t = test_service();
        let app = router(t.service.clone(), None);

        let response = send(
            &app,
            json_request("DELETE", "/api/collections/doc_nothing", json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "collection_not_found");
    }
}
