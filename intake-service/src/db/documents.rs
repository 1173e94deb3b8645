//! Document CRUD operations.
//!
//! This module contains the document-related database operations including
//! insert, get, list, status updates, cascading delete and user statistics.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{
    DOCUMENT_COLUMNS, Document, DocumentStatus, DocumentUpdate, NewDocument, UserStats,
    format_timestamp,
};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

impl Database {
    /// Insert a new document
    pub(super) fn insert_document(&self, new: NewDocument) -> ServiceResult<Document> {
        let now = Utc::now();
        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            filename: new.original_name.clone(),
            original_name: new.original_name,
            file_size: new.file_size,
            mime_type: new.mime_type,
            status: DocumentStatus::Uploaded,
            ocr_text: None,
            image_count: 0,
            vector_count: 0,
            storage_url: None,
            processing_error: None,
            category_id: new.category_id,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO documents (id, user_id, filename, original_name, file_size, mime_type, status, image_count, vector_count, category_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?9, ?10)
            "#,
            params![
                document.id,
                document.user_id,
                document.filename,
                document.original_name,
                document.file_size as i64,
                document.mime_type,
                document.status.as_str(),
                document.category_id,
                format_timestamp(&document.created_at),
                format_timestamp(&document.updated_at),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(document)
    }

    /// Get a document by ID
    pub(super) fn find_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn.lock().unwrap();
        let document = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id],
                Document::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(document)
    }

    /// Merge a partial update into a document
    pub(super) fn apply_document_update(
        &self,
        id: &str,
        update: DocumentUpdate,
    ) -> ServiceResult<Document> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            let clear_category = matches!(update.category_id, Some(None));
            conn.execute(
                r#"
                UPDATE documents SET
                    filename = COALESCE(?2, filename),
                    ocr_text = COALESCE(?3, ocr_text),
                    image_count = COALESCE(?4, image_count),
                    vector_count = COALESCE(?5, vector_count),
                    storage_url = COALESCE(?6, storage_url),
                    category_id = CASE WHEN ?8 THEN NULL ELSE COALESCE(?7, category_id) END,
                    updated_at = ?9
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.filename,
                    update.ocr_text,
                    update.image_count.map(|c| c as i64),
                    update.vector_count.map(|c| c as i64),
                    update.storage_url,
                    update.category_id.flatten(),
                    clear_category,
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(DatabaseError::Query)?
        };

        if changed == 0 {
            return Err(ServiceError::DocumentNotFound {
                document_id: id.to_string(),
            });
        }

        self.find_document(id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: id.to_string(),
            })
    }

    /// Update a document's status and processing error
    pub(super) fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE documents SET status = ?2, processing_error = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, status.as_str(), error, format_timestamp(&Utc::now())],
            )
            .map_err(DatabaseError::Query)?;

        if changed == 0 {
            return Err(ServiceError::DocumentNotFound {
                document_id: id.to_string(),
            });
        }
        Ok(())
    }

    /// List a user's documents, newest first
    pub(super) fn list_user_documents(&self, user_id: &str) -> ServiceResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                DOCUMENT_COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let documents = stmt
            .query_map(params![user_id], Document::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(documents)
    }

    /// Delete a document. Images, vectors and queue items go with it through
    /// `ON DELETE CASCADE`.
    pub(super) fn remove_document(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;
        Ok(deleted > 0)
    }

    /// Aggregate counters over a user's documents
    pub(super) fn aggregate_user_stats(&self, user_id: &str) -> ServiceResult<UserStats> {
        let conn = self.conn.lock().unwrap();
        let stats = conn
            .query_row(
                r#"
                SELECT
                    COUNT(CASE WHEN status = 'completed' THEN 1 END),
                    COALESCE(SUM(image_count), 0),
                    COALESCE(SUM(vector_count), 0),
                    COALESCE(SUM(file_size), 0)
                FROM documents
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    let processed: i64 = row.get(0)?;
                    let images: i64 = row.get(1)?;
                    let vectors: i64 = row.get(2)?;
                    let storage: i64 = row.get(3)?;
                    Ok(UserStats {
                        documents_processed: processed as u64,
                        images_extracted: images as u64,
                        vector_embeddings: vectors as u64,
                        storage_used: storage as u64,
                    })
                },
            )
            .map_err(DatabaseError::Query)?;
        Ok(stats)
    }
}
