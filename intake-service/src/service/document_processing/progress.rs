//! Checkpoint recording and WebSocket progress broadcast.

use tracing::debug;

use crate::db::models::{
    DocumentStatus, ProcessingQueueItem, ProcessingStep, QueueItemUpdate, QueueStatus,
};
use crate::error::ServiceResult;
use crate::service::IntakeService;
use crate::websocket::ProcessingUpdate;

/// Points in a run where progress is persisted. Each maps to exactly one
/// step and progress value, so progress never decreases within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Checkpoint {
    Queued,
    Started,
    TextExtracted,
    DocumentStored,
    ImagesStored,
    Embedded,
    Completed,
}

impl Checkpoint {
    pub fn step(self) -> ProcessingStep {
        match self {
            Checkpoint::Queued | Checkpoint::Started | Checkpoint::TextExtracted => {
                ProcessingStep::Ocr
            }
            Checkpoint::DocumentStored | Checkpoint::ImagesStored => ProcessingStep::Storage,
            Checkpoint::Embedded | Checkpoint::Completed => ProcessingStep::Vectorization,
        }
    }

    pub fn progress(self) -> u8 {
        match self {
            Checkpoint::Queued => 0,
            Checkpoint::Started => 10,
            Checkpoint::TextExtracted => 30,
            Checkpoint::DocumentStored => 50,
            Checkpoint::ImagesStored => 60,
            Checkpoint::Embedded => 80,
            Checkpoint::Completed => 100,
        }
    }

    fn queue_status(self) -> QueueStatus {
        match self {
            Checkpoint::Queued => QueueStatus::Pending,
            Checkpoint::Completed => QueueStatus::Completed,
            _ => QueueStatus::Processing,
        }
    }

    fn document_status(self) -> DocumentStatus {
        match self {
            Checkpoint::Queued => DocumentStatus::Uploaded,
            Checkpoint::Completed => DocumentStatus::Completed,
            _ => DocumentStatus::Processing,
        }
    }
}

impl IntakeService {
    /// Persist a checkpoint on the run's queue item and push it to the owner
    pub(crate) fn record_checkpoint(
        &self,
        user_id: &str,
        queue_item_id: &str,
        checkpoint: Checkpoint,
    ) -> ServiceResult<ProcessingQueueItem> {
        let item = self.store.update_processing_queue_item(
            queue_item_id,
            QueueItemUpdate {
                status: Some(checkpoint.queue_status()),
                step: Some(checkpoint.step()),
                progress: Some(checkpoint.progress()),
                error: Some(None),
            },
        )?;

        debug!(
            doc_id = %item.document_id,
            step = item.step.as_str(),
            progress = item.progress,
            "Checkpoint recorded"
        );

        self.broadcast_processing_update(user_id, &item, checkpoint.document_status());
        Ok(item)
    }

    /// Mark the run's queue item failed, keeping the step and progress it reached
    pub(crate) fn record_failure(
        &self,
        user_id: &str,
        queue_item_id: &str,
        message: &str,
    ) -> ServiceResult<ProcessingQueueItem> {
        let item = self.store.update_processing_queue_item(
            queue_item_id,
            QueueItemUpdate {
                status: Some(QueueStatus::Failed),
                error: Some(Some(message.to_string())),
                ..Default::default()
            },
        )?;

        self.broadcast_processing_update(user_id, &item, DocumentStatus::Failed);
        Ok(item)
    }

    fn broadcast_processing_update(
        &self,
        user_id: &str,
        item: &ProcessingQueueItem,
        document_status: DocumentStatus,
    ) {
        self.ws_manager.broadcast_processing_update(
            user_id,
            ProcessingUpdate {
                item: item.clone(),
                document_status,
            },
        );
    }
}
