//! Extracted image operations.

use chrono::Utc;
use rusqlite::params;

use super::Database;
use super::models::{ExtractedImage, NewExtractedImage, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Insert an extracted image record
    pub(super) fn insert_extracted_image(
        &self,
        new: NewExtractedImage,
    ) -> ServiceResult<ExtractedImage> {
        let image = ExtractedImage {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: new.document_id,
            filename: new.filename,
            storage_url: new.storage_url,
            annotation: new.annotation,
            page_number: new.page_number,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO extracted_images (id, document_id, filename, storage_url, annotation, page_number, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                image.id,
                image.document_id,
                image.filename,
                image.storage_url,
                image.annotation,
                image.page_number,
                format_timestamp(&image.created_at),
            ],
        )
        .map_err(|e| super::missing_document(e, &image.document_id))?;

        Ok(image)
    }

    /// Get all images for a document in page order
    pub(super) fn list_document_images(
        &self,
        document_id: &str,
    ) -> ServiceResult<Vec<ExtractedImage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, document_id, filename, storage_url, annotation, page_number, created_at
                FROM extracted_images
                WHERE document_id = ?1
                ORDER BY page_number IS NULL, page_number, created_at, rowid
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let images = stmt
            .query_map(params![document_id], ExtractedImage::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(images)
    }
}
