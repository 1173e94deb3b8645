//! Document API endpoints.
//!
//! Handlers for upload, listing, retrieval, category assignment and delete,
//! plus the per-document images, vectors and processing views.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use super::auth::Principal;
use super::double_option;
use crate::db::models::{Document, ExtractedImage, ProcessingQueueItem, VectorEmbedding};
use crate::error::ServiceError;
use crate::service::{UploadAccepted, UploadRequest};

/// Multipart field carrying the file
const DOCUMENT_FIELD: &str = "document";
const CATEGORY_FIELD: &str = "categoryId";

/// Request to change document metadata
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDocumentRequest {
    /// `null` removes the document from its category
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<String>>,
}

fn bad_multipart(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::InvalidRequest {
        message: format!("Invalid multipart body: {}", e),
    }
}

/// Accept a file for processing
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), ServiceError> {
    let mut upload: Option<UploadRequest> = None;
    let mut category_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            DOCUMENT_FIELD => {
                let original_name = field.file_name().unwrap_or("document").to_string();
                let declared_mime = field.content_type().map(String::from);
                let content = field.bytes().await.map_err(bad_multipart)?;
                upload = Some(UploadRequest {
                    content,
                    original_name,
                    declared_mime,
                    category_id: None,
                });
            }
            CATEGORY_FIELD => {
                let value = field.text().await.map_err(bad_multipart)?;
                let value = value.trim();
                if !value.is_empty() {
                    category_id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| ServiceError::InvalidRequest {
        message: format!("Missing '{}' file field", DOCUMENT_FIELD),
    })?;
    upload.category_id = category_id;

    let accepted = state.service.accept_upload(&principal.user_id, upload)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// The caller's documents, newest first
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<Document>>, ServiceError> {
    Ok(Json(state.service.list_documents(&principal.user_id)?))
}

pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    Ok(Json(state.service.get_owned_document(&principal.user_id, &id)?))
}

pub async fn update_document_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateDocumentRequest>,
) -> Result<Json<Document>, ServiceError> {
    let document = match request.category_id {
        Some(category_id) => {
            state
                .service
                .set_document_category(&principal.user_id, &id, category_id)?
        }
        None => state.service.get_owned_document(&principal.user_id, &id)?,
    };
    Ok(Json(document))
}

pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_document(&principal.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_document_images_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Vec<ExtractedImage>>, ServiceError> {
    Ok(Json(state.service.document_images(&principal.user_id, &id)?))
}

pub async fn get_document_vectors_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Vec<VectorEmbedding>>, ServiceError> {
    Ok(Json(state.service.document_vectors(&principal.user_id, &id)?))
}

/// Latest queue item of a document
pub async fn get_document_processing_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ProcessingQueueItem>, ServiceError> {
    Ok(Json(
        state
            .service
            .document_processing_status(&principal.user_id, &id)?,
    ))
}
