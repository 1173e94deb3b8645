//! Persistence contract shared by every storage backend.
//!
//! [`crate::db::Database`] is the production implementation. The in-memory
//! [`memory::MemoryStore`] exists for tests only, and both run the same
//! contract suite in [`contract`].

use crate::db::models::{
    Category, CategoryUpdate, Document, DocumentStatus, DocumentUpdate, ExtractedImage,
    ModelConfigUpdate, ModelConfiguration, ModelPurpose, NewCategory, NewDocument,
    NewExtractedImage, NewModelConfig, NewVectorEmbedding, ProcessingQueueItem, QueueItemUpdate,
    UserStats, VectorEmbedding,
};
use crate::error::ServiceResult;

#[cfg(test)]
pub mod contract;
#[cfg(test)]
pub mod memory;

/// Storage operations used by the API layer and the processing pipeline.
///
/// Implementations must cascade [`DocumentStore::delete_document`] to the
/// document's images, vectors and queue items, and must refresh
/// `updated_at` on every mutation.
pub trait DocumentStore: Send + Sync {
    // === Documents ===

    /// Insert a document with status `uploaded` and zero counts
    fn create_document(&self, new: NewDocument) -> ServiceResult<Document>;

    fn get_document(&self, id: &str) -> ServiceResult<Option<Document>>;

    /// Merge the provided fields; fails with `DocumentNotFound` for unknown ids
    fn update_document(&self, id: &str, update: DocumentUpdate) -> ServiceResult<Document>;

    /// Set the status and processing error (`None` clears the error)
    fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> ServiceResult<()>;

    /// All documents owned by `user_id`, newest first
    fn get_user_documents(&self, user_id: &str) -> ServiceResult<Vec<Document>>;

    /// Delete a document and everything that hangs off it.
    /// Returns `false` when the document did not exist.
    fn delete_document(&self, id: &str) -> ServiceResult<bool>;

    // === Extracted images ===

    /// Fails with `DocumentNotFound` for an unknown document, as do the other
    /// child inserts
    fn create_extracted_image(&self, new: NewExtractedImage) -> ServiceResult<ExtractedImage>;

    fn get_document_images(&self, document_id: &str) -> ServiceResult<Vec<ExtractedImage>>;

    // === Vector embeddings ===

    fn create_vector_embedding(&self, new: NewVectorEmbedding) -> ServiceResult<VectorEmbedding>;

    /// Vectors for a document in chunk order
    fn get_document_vectors(&self, document_id: &str) -> ServiceResult<Vec<VectorEmbedding>>;

    /// Remove every vector of a document, returning how many were removed
    fn delete_document_vectors(&self, document_id: &str) -> ServiceResult<usize>;

    // === Processing queue ===

    /// Create a `pending` item at step `ocr` with progress 0
    fn create_processing_queue_item(&self, document_id: &str)
    -> ServiceResult<ProcessingQueueItem>;

    fn update_processing_queue_item(
        &self,
        id: &str,
        update: QueueItemUpdate,
    ) -> ServiceResult<ProcessingQueueItem>;

    /// Items in `processing` whose document belongs to `user_id`, newest first
    fn get_active_processing_items(&self, user_id: &str)
    -> ServiceResult<Vec<ProcessingQueueItem>>;

    fn get_latest_queue_item(&self, document_id: &str)
    -> ServiceResult<Option<ProcessingQueueItem>>;

    // === Analytics ===

    fn get_user_stats(&self, user_id: &str) -> ServiceResult<UserStats>;

    // === Categories ===

    /// Fails with `Conflict` when the user already has a category of that name
    fn create_category(&self, new: NewCategory) -> ServiceResult<Category>;

    fn list_categories(&self, user_id: &str) -> ServiceResult<Vec<Category>>;

    fn get_category(&self, id: &str) -> ServiceResult<Option<Category>>;

    fn update_category(&self, id: &str, update: CategoryUpdate) -> ServiceResult<Category>;

    /// Documents in the category keep existing with no category
    fn delete_category(&self, id: &str) -> ServiceResult<bool>;

    // === Model configurations ===

    /// An active configuration deactivates the user's other ones for the same purpose
    fn create_model_config(&self, new: NewModelConfig) -> ServiceResult<ModelConfiguration>;

    fn list_model_configs(&self, user_id: &str) -> ServiceResult<Vec<ModelConfiguration>>;

    fn get_model_config(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>>;

    fn update_model_config(
        &self,
        id: &str,
        update: ModelConfigUpdate,
    ) -> ServiceResult<ModelConfiguration>;

    fn delete_model_config(&self, id: &str) -> ServiceResult<bool>;

    fn active_model_config(
        &self,
        user_id: &str,
        purpose: ModelPurpose,
    ) -> ServiceResult<Option<ModelConfiguration>>;
}
