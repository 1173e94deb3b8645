//! Processing queue operations.
//!
//! Queue items are the polling surface for clients: one item per pipeline
//! run, updated at every checkpoint.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{
    ProcessingQueueItem, ProcessingStep, QUEUE_COLUMNS, QueueItemUpdate, QueueStatus,
    format_timestamp,
};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

impl Database {
    /// Insert a pending queue item for a document
    pub(super) fn insert_queue_item(&self, document_id: &str) -> ServiceResult<ProcessingQueueItem> {
        let now = Utc::now();
        let item = ProcessingQueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            status: QueueStatus::Pending,
            step: ProcessingStep::Ocr,
            progress: 0,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO processing_queue (id, document_id, status, step, progress, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)
            "#,
            params![
                item.id,
                item.document_id,
                item.status.as_str(),
                item.step.as_str(),
                item.progress as i64,
                format_timestamp(&item.created_at),
                format_timestamp(&item.updated_at),
            ],
        )
        .map_err(|e| super::missing_document(e, document_id))?;

        Ok(item)
    }

    /// Merge a partial update into a queue item
    pub(super) fn apply_queue_item_update(
        &self,
        id: &str,
        update: QueueItemUpdate,
    ) -> ServiceResult<ProcessingQueueItem> {
        let conn = self.conn.lock().unwrap();
        let clear_error = matches!(update.error, Some(None));
        let changed = conn
            .execute(
                r#"
                UPDATE processing_queue SET
                    status = COALESCE(?2, status),
                    step = COALESCE(?3, step),
                    progress = COALESCE(?4, progress),
                    error = CASE WHEN ?6 THEN NULL ELSE COALESCE(?5, error) END,
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.status.map(|s| s.as_str()),
                    update.step.map(|s| s.as_str()),
                    update.progress.map(|p| p.min(100) as i64),
                    update.error.flatten(),
                    clear_error,
                    format_timestamp(&Utc::now()),
                ],
            )
            .map_err(DatabaseError::Query)?;

        if changed == 0 {
            return Err(ServiceError::QueueItemNotFound {
                item_id: id.to_string(),
            });
        }

        let item = conn
            .query_row(
                &format!("SELECT {} FROM processing_queue WHERE id = ?1", QUEUE_COLUMNS),
                params![id],
                ProcessingQueueItem::from_row,
            )
            .map_err(DatabaseError::Query)?;
        Ok(item)
    }

    /// Queue items currently processing for documents owned by the user
    pub(super) fn list_active_queue_items(
        &self,
        user_id: &str,
    ) -> ServiceResult<Vec<ProcessingQueueItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT q.id, q.document_id, q.status, q.step, q.progress, q.error, q.created_at, q.updated_at
                FROM processing_queue q
                JOIN documents d ON d.id = q.document_id
                WHERE d.user_id = ?1 AND q.status = 'processing'
                ORDER BY q.created_at DESC, q.rowid DESC
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let items = stmt
            .query_map(params![user_id], ProcessingQueueItem::from_row)
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok(items)
    }

    /// Most recent queue item of a document
    pub(super) fn find_latest_queue_item(
        &self,
        document_id: &str,
    ) -> ServiceResult<Option<ProcessingQueueItem>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM processing_queue WHERE document_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    QUEUE_COLUMNS
                ),
                params![document_id],
                ProcessingQueueItem::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?;
        Ok(item)
    }
}
