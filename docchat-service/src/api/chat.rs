//! Chat endpoint.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ServiceError;

use super::AppState;

/// A question about one indexed collection
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub collection_name: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Answer a question from the chunks of a completed collection
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ServiceError> {
    let response = state
        .service
        .chat(&request.query, &request.collection_name)
        .await?;
    Ok(Json(ChatResponse { response }))
}
