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
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("Processing queue item not found: {item_id}")]
    QueueItemNotFound { item_id: String },

    #[error("Category not found: {category_id}")]
    CategoryNotFound { category_id: String },

    #[error("Model configuration not found: {config_id}")]
    ModelConfigNotFound { config_id: String },

    #[error("Unsupported file type: {mime_type}")]
    UnsupportedMediaType { mime_type: String },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Access to {resource} denied")]
    Forbidden { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors from the hosted OCR, embedding and object storage providers
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection failed to {service} at {url}")]
    Connection {
        service: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} request failed (status {status}): {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("Embedding count mismatch: sent {expected} inputs, received {actual} vectors")]
    EmbeddingMismatch { expected: usize, actual: usize },
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

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),

    #[error("Database directory unavailable")]
    Io(#[source] std::io::Error),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. }
            | ServiceError::QueueItemNotFound { .. }
            | ServiceError::CategoryNotFound { .. }
            | ServiceError::ModelConfigNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::UnsupportedMediaType { .. }
            | ServiceError::FileTooLarge { .. }
            | ServiceError::EmptyFile
            | ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Provider(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Database(_) | ServiceError::Config { .. } | ServiceError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::QueueItemNotFound { .. } => "queue_item_not_found",
            ServiceError::CategoryNotFound { .. } => "category_not_found",
            ServiceError::ModelConfigNotFound { .. } => "model_config_not_found",
            ServiceError::UnsupportedMediaType { .. } => "unsupported_media_type",
            ServiceError::FileTooLarge { .. } => "file_too_large",
            ServiceError::EmptyFile => "empty_file",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::Forbidden { .. } => "forbidden",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Provider(ProviderError::Connection { .. }) => "provider_connection",
            ServiceError::Provider(ProviderError::Status { .. }) => "provider_status",
            ServiceError::Provider(ProviderError::InvalidResponse { .. }) => {
                "provider_invalid_response"
            }
            ServiceError::Provider(ProviderError::EmbeddingMismatch { .. }) => {
                "embedding_mismatch"
            }
            ServiceError::Database(_) => "database_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %format_error_chain_ref(&self), "Request failed");
        }

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error together with its `source()` chain, separated by `: `.
pub fn format_error_chain_ref(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
