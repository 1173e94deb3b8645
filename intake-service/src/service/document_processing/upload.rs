//! Upload validation and queueing.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use super::progress::Checkpoint;
use crate::db::models::{DocumentStatus, NewDocument};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::service::IntakeService;

/// Content types accepted for upload
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/png",
    "image/jpeg",
    "image/tiff",
];

/// A file received from a client
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub content: Bytes,
    pub original_name: String,
    /// Content type sent with the file, if any
    pub declared_mime: Option<String>,
    pub category_id: Option<String>,
}

/// Response to an accepted upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub document_id: String,
    pub status: DocumentStatus,
}

impl IntakeService {
    /// Validate an upload, persist the document and its queue item, and start
    /// processing in the background.
    ///
    /// Returns as soon as the run is spawned. Invalid uploads create nothing.
    pub fn accept_upload(
        self: &Arc<Self>,
        user_id: &str,
        request: UploadRequest,
    ) -> ServiceResult<UploadAccepted> {
        let mime_type = resolve_mime_type(request.declared_mime.as_deref(), &request.original_name)?;

        let size = request.content.len() as u64;
        if size == 0 {
            return Err(ServiceError::EmptyFile);
        }
        let max = self.config.limits.max_upload_bytes;
        if size > max {
            return Err(ServiceError::FileTooLarge { size, max });
        }

        if let Some(category_id) = &request.category_id {
            self.require_assignable_category(user_id, category_id)?;
        }

        let doc = self.store.create_document(NewDocument {
            user_id: user_id.to_string(),
            original_name: request.original_name,
            file_size: size,
            mime_type,
            category_id: request.category_id,
        })?;

        let item = match self.store.create_processing_queue_item(&doc.id) {
            Ok(item) => item,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_document(&doc.id) {
                    error!(
                        doc_id = %doc.id,
                        error = %format_error_chain_ref(&cleanup),
                        "Failed to remove document after queueing error"
                    );
                }
                return Err(e);
            }
        };
        self.record_checkpoint(user_id, &item.id, Checkpoint::Queued)?;

        metrics::counter!("intake_documents_uploaded_total").increment(1);
        info!(
            doc_id = %doc.id,
            user_id = %user_id,
            original_name = %doc.original_name,
            mime_type = %doc.mime_type,
            size = size,
            "Document accepted for processing"
        );

        let document_id = doc.id.clone();
        self.spawn_run(doc, request.content, item.id);

        Ok(UploadAccepted {
            document_id,
            status: DocumentStatus::Processing,
        })
    }

    /// A category may be assigned only by its owner
    pub(crate) fn require_assignable_category(
        &self,
        user_id: &str,
        category_id: &str,
    ) -> ServiceResult<()> {
        match self.store.get_category(category_id)? {
            Some(category) if category.user_id == user_id => Ok(()),
            _ => Err(ServiceError::InvalidRequest {
                message: format!("Unknown category: {}", category_id),
            }),
        }
    }
}

/// Determine the effective content type of an upload and check it against
/// the allow-list. Parameters are ignored; a missing or generic declared type
/// falls back to the file extension.
fn resolve_mime_type(declared: Option<&str>, file_name: &str) -> ServiceResult<String> {
    let declared = declared
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .map(|parsed| parsed.essence_str().to_ascii_lowercase())
        .filter(|essence| essence != mime::APPLICATION_OCTET_STREAM.essence_str());

    let mime_type = declared.unwrap_or_else(|| {
        mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    // Progressive JPEG is still JPEG
    let mime_type = if mime_type == "image/pjpeg" {
        mime::IMAGE_JPEG.essence_str().to_string()
    } else {
        mime_type
    };

    if ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
        Ok(mime_type)
    } else {
        Err(ServiceError::UnsupportedMediaType { mime_type })
    }
}
