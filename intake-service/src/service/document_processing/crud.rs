//! Document CRUD operations scoped to the requesting user.

use tracing::{info, warn};

use crate::db::models::{
    Document, DocumentUpdate, ExtractedImage, ProcessingQueueItem, VectorEmbedding,
};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::service::IntakeService;

impl IntakeService {
    /// Fetch a document the user owns: 404 when absent, 403 when someone else's
    pub fn get_owned_document(&self, user_id: &str, document_id: &str) -> ServiceResult<Document> {
        let doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })?;

        if doc.user_id != user_id {
            return Err(ServiceError::Forbidden {
                resource: format!("document {}", document_id),
            });
        }
        Ok(doc)
    }

    /// The user's documents, newest first
    pub fn list_documents(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        self.store.get_user_documents(user_id)
    }

    pub fn document_images(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> ServiceResult<Vec<ExtractedImage>> {
        let doc = self.get_owned_document(user_id, document_id)?;
        self.store.get_document_images(&doc.id)
    }

    pub fn document_vectors(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> ServiceResult<Vec<VectorEmbedding>> {
        let doc = self.get_owned_document(user_id, document_id)?;
        self.store.get_document_vectors(&doc.id)
    }

    /// Latest queue item of a document
    pub fn document_processing_status(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> ServiceResult<ProcessingQueueItem> {
        let doc = self.get_owned_document(user_id, document_id)?;
        self.store
            .get_latest_queue_item(&doc.id)?
            .ok_or_else(|| ServiceError::QueueItemNotFound {
                item_id: format!("latest for document {}", doc.id),
            })
    }

    /// Assign a document to one of the user's categories, or clear it
    pub fn set_document_category(
        &self,
        user_id: &str,
        document_id: &str,
        category_id: Option<String>,
    ) -> ServiceResult<Document> {
        let doc = self.get_owned_document(user_id, document_id)?;
        if let Some(category_id) = &category_id {
            self.require_assignable_category(user_id, category_id)?;
        }

        self.store.update_document(
            &doc.id,
            DocumentUpdate {
                category_id: Some(category_id),
                ..Default::default()
            },
        )
    }

    /// Delete a document with its images, vectors and queue items.
    ///
    /// Any unfinished run is cancelled first. Provider-side vectors are
    /// removed on a best-effort basis.
    pub async fn delete_document(&self, user_id: &str, document_id: &str) -> ServiceResult<()> {
        let doc = self.get_owned_document(user_id, document_id)?;

        let cancelled = self.cancel_processing(&doc.id);
        if !self.store.delete_document(&doc.id)? {
            return Err(ServiceError::DocumentNotFound {
                document_id: doc.id,
            });
        }

        if let Err(e) = self.storage.delete_document_vectors(&doc.id).await {
            warn!(
                doc_id = %doc.id,
                error = %format_error_chain_ref(&e),
                "Failed to remove provider vectors for deleted document"
            );
        }

        info!(
            doc_id = %doc.id,
            user_id = %user_id,
            cancelled_run = cancelled,
            "Document deleted"
        );
        Ok(())
    }

    /// Queue items of the user's documents that are currently processing
    pub fn active_processing(&self, user_id: &str) -> ServiceResult<Vec<ProcessingQueueItem>> {
        self.store.get_active_processing_items(user_id)
    }
}
