use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Collection not found: {collection_name}")]
    CollectionNotFound { collection_name: String },

    #[error("Collection {collection_name} is not ready (task is {status})")]
    CollectionNotReady {
        collection_name: String,
        status: String,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{0}")]
    Processing(#[from] ProcessingError),

    #[error("Indexing failed")]
    Indexing(#[from] IndexingError),

    #[error("Generation failed")]
    Generation(#[from] ProviderError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Document extraction errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Could not extract text: {message}")]
    ExtractionFailed { message: String },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// Chunk indexing errors
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Embedding provider failed")]
    Embedding(#[source] ProviderError),

    #[error("Vector store write failed: {message}")]
    Store { message: String },
}

/// Hosted model provider errors (embeddings and generation)
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection failed to {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Provider quota exhausted")]
    Quota { message: String },

    #[error("Invalid response from provider: {message}")]
    InvalidResponse { message: String },

    #[error("No API key configured for provider {provider}")]
    MissingApiKey { provider: String },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::CollectionNotFound { .. }
            | ServiceError::CollectionNotReady { .. }
            | ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServiceError::Generation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::TaskNotFound { .. } => "task_not_found",
            ServiceError::CollectionNotFound { .. } => "collection_not_found",
            ServiceError::CollectionNotReady { .. } => "collection_not_ready",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => "file_too_large",
            ServiceError::Processing(ProcessingError::ExtractionFailed { .. }) => {
                "extraction_failed"
            }
            ServiceError::Processing(ProcessingError::Io(_)) => "io_error",
            ServiceError::Indexing(_) => "indexing_failed",
            ServiceError::Generation(_) => "generation_failed",
            ServiceError::Database(_) => "database_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Message that is safe to show to an end user.
    ///
    /// Upstream and storage failures are reduced to a generic text; their
    /// details only go to the log.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Generation(_) => {
                "The language model could not generate a response. Please try again.".to_string()
            }
            ServiceError::Indexing(IndexingError::Embedding(_)) => {
                "The embedding service failed while indexing the document.".to_string()
            }
            ServiceError::Indexing(IndexingError::Store { .. }) => {
                "The document could not be saved to the vector store.".to_string()
            }
            ServiceError::Database(_) => "A storage error occurred.".to_string(),
            ServiceError::Internal { .. } => "An internal error occurred.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Query(e)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %format_error_chain(&self), "Request failed");
        }

        let response = ErrorResponse {
            message: self.user_message(),
            code: Some(self.error_code().to_string()),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as a single line.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}
