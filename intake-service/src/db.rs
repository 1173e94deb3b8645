//! Database module for SQLite operations.
//!
//! This module provides the `Database` struct, the production
//! [`DocumentStore`] implementation, with operations organized into
//! submodules by record type.

mod categories;
mod documents;
mod images;
mod migrations;
mod model_configs;
pub mod models;
mod queue;
mod vectors;

pub use models::{
    Category, CategoryUpdate, Document, DocumentStatus, DocumentUpdate, ExtractedImage,
    ModelConfigUpdate, ModelConfiguration, ModelPurpose, NewCategory, NewDocument,
    NewExtractedImage, NewModelConfig, NewVectorEmbedding, ProcessingQueueItem, QueueItemUpdate,
    UserStats, VectorEmbedding,
};

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{DatabaseError, ServiceError, ServiceResult};
use crate::store::DocumentStore;

/// Map a foreign key violation on a child row to the missing parent document
fn missing_document(e: rusqlite::Error, document_id: &str) -> ServiceError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            }
        }
        other => ServiceError::Database(DatabaseError::Query(other)),
    }
}

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DatabaseError::Io)?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(DatabaseError::Query)?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ServiceResult<Self> {
        // Cascading deletes depend on this pragma
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DocumentStore for Database {
    fn create_document(&self, new: NewDocument) -> ServiceResult<Document> {
        self.insert_document(new)
    }

    fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        self.find_document(id)
    }

    fn update_document(&self, id: &str, update: DocumentUpdate) -> ServiceResult<Document> {
        self.apply_document_update(id, update)
    }

    fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> ServiceResult<()> {
        self.set_document_status(id, status, error)
    }

    fn get_user_documents(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        self.list_user_documents(user_id)
    }

    fn delete_document(&self, id: &str) -> ServiceResult<bool> {
        self.remove_document(id)
    }

    fn create_extracted_image(&self, new: NewExtractedImage) -> ServiceResult<ExtractedImage> {
        self.insert_extracted_image(new)
    }

    fn get_document_images(&self, document_id: &str) -> ServiceResult<Vec<ExtractedImage>> {
        self.list_document_images(document_id)
    }

    fn create_vector_embedding(&self, new: NewVectorEmbedding) -> ServiceResult<VectorEmbedding> {
        self.insert_vector_embedding(new)
    }

    fn get_document_vectors(&self, document_id: &str) -> ServiceResult<Vec<VectorEmbedding>> {
        self.list_document_vectors(document_id)
    }

    fn delete_document_vectors(&self, document_id: &str) -> ServiceResult<usize> {
        self.remove_document_vectors(document_id)
    }

    fn create_processing_queue_item(
        &self,
        document_id: &str,
    ) -> ServiceResult<ProcessingQueueItem> {
        self.insert_queue_item(document_id)
    }

    fn update_processing_queue_item(
        &self,
        id: &str,
        update: QueueItemUpdate,
    ) -> ServiceResult<ProcessingQueueItem> {
        self.apply_queue_item_update(id, update)
    }

    fn get_active_processing_items(
        &self,
        user_id: &str,
    ) -> ServiceResult<Vec<ProcessingQueueItem>> {
        self.list_active_queue_items(user_id)
    }

    fn get_latest_queue_item(
        &self,
        document_id: &str,
    ) -> ServiceResult<Option<ProcessingQueueItem>> {
        self.find_latest_queue_item(document_id)
    }

    fn get_user_stats(&self, user_id: &str) -> ServiceResult<UserStats> {
        self.aggregate_user_stats(user_id)
    }

    fn create_category(&self, new: NewCategory) -> ServiceResult<Category> {
        self.insert_category(new)
    }

    fn list_categories(&self, user_id: &str) -> ServiceResult<Vec<Category>> {
        self.list_user_categories(user_id)
    }

    fn get_category(&self, id: &str) -> ServiceResult<Option<Category>> {
        self.find_category(id)
    }

    fn update_category(&self, id: &str, update: CategoryUpdate) -> ServiceResult<Category> {
        self.apply_category_update(id, update)
    }

    fn delete_category(&self, id: &str) -> ServiceResult<bool> {
        self.remove_category(id)
    }

    fn create_model_config(&self, new: NewModelConfig) -> ServiceResult<ModelConfiguration> {
        self.insert_model_config(new)
    }

    fn list_model_configs(&self, user_id: &str) -> ServiceResult<Vec<ModelConfiguration>> {
        self.list_user_model_configs(user_id)
    }

    fn get_model_config(&self, id: &str) -> ServiceResult<Option<ModelConfiguration>> {
        self.find_model_config(id)
    }

    fn update_model_config(
        &self,
        id: &str,
        update: ModelConfigUpdate,
    ) -> ServiceResult<ModelConfiguration> {
        self.apply_model_config_update(id, update)
    }

    fn delete_model_config(&self, id: &str) -> ServiceResult<bool> {
        self.remove_model_config(id)
    }

    fn active_model_config(
        &self,
        user_id: &str,
        purpose: ModelPurpose,
    ) -> ServiceResult<Option<ModelConfiguration>> {
        self.find_active_model_config(user_id, purpose)
    }
}
