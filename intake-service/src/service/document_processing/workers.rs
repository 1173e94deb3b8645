//! Supervision of background pipeline runs.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db::models::Document;
use crate::service::IntakeService;

/// Bookkeeping for a spawned run
pub(crate) struct InFlightRun {
    pub(crate) user_id: String,
    pub(crate) queue_item_id: String,
    pub(crate) token: CancellationToken,
    pub(crate) started_at: Instant,
}

impl IntakeService {
    /// Spawn a pipeline run for an accepted document onto the task tracker.
    /// The run waits for a concurrency permit before doing any work.
    pub(crate) fn spawn_run(self: &Arc<Self>, doc: Document, content: Bytes, queue_item_id: String) {
        let token = CancellationToken::new();
        self.in_flight.insert(
            doc.id.clone(),
            InFlightRun {
                user_id: doc.user_id.clone(),
                queue_item_id: queue_item_id.clone(),
                token: token.clone(),
                started_at: Instant::now(),
            },
        );

        let service = Arc::clone(self);
        self.tracker.spawn(async move {
            service.run_pipeline(doc, content, queue_item_id, token).await;
        });
    }

    /// Number of runs spawned and not yet finished
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Document ids of the caller's unfinished runs
    #[cfg(test)]
    pub fn in_flight_documents(&self, user_id: &str) -> Vec<String> {
        self.in_flight
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Stop accepting runs and wait for outstanding ones.
    ///
    /// Runs still going after `processing.shutdown_grace_secs` are cancelled;
    /// their records stay at the last checkpoint they reached.
    pub async fn shutdown(&self) {
        self.tracker.close();
        let grace = self.config.processing.shutdown_grace();
        info!(
            in_flight = self.in_flight_count(),
            grace_secs = grace.as_secs(),
            "Waiting for in-flight processing runs"
        );

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            for entry in self.in_flight.iter() {
                let run = entry.value();
                warn!(
                    doc_id = %entry.key(),
                    queue_item_id = %run.queue_item_id,
                    elapsed_secs = run.started_at.elapsed().as_secs(),
                    "Cancelling processing run at shutdown"
                );
                run.token.cancel();
            }
            self.tracker.wait().await;
        }

        info!("All processing runs finished");
    }

    /// Wait for every run spawned so far, then accept new ones again
    #[cfg(test)]
    pub(crate) async fn wait_for_runs(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::db::models::{DocumentStatus, QueueStatus};
    use crate::service::UploadRequest;
    use crate::service::testing::{FakeAi, FakeStorage, service_with_config};
    use std::time::Duration;

    fn upload(text: &str) -> UploadRequest {
        UploadRequest {
            content: Bytes::from(text.to_string()),
            original_name: "scan.pdf".to_string(),
            declared_mime: Some("application/pdf".to_string()),
            category_id: None,
        }
    }

    fn slow_ai(delay: Duration) -> Arc<FakeAi> {
        Arc::new(FakeAi {
            delay: Some(delay),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_runs_beyond_the_cap_stay_pending() {
        let mut config = test_config();
        config.processing.max_concurrent_runs = 1;
        let service = service_with_config(
            config,
            slow_ai(Duration::from_millis(300)),
            Arc::new(FakeStorage::default()),
        );

        let first = service.accept_upload("alice", upload("first")).unwrap();
        let second = service.accept_upload("alice", upload("second")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let statuses: Vec<(DocumentStatus, QueueStatus)> = [&first, &second]
            .iter()
            .map(|accepted| {
                let doc = service.store.get_document(&accepted.document_id).unwrap().unwrap();
                let item = service
                    .store
                    .get_latest_queue_item(&accepted.document_id)
                    .unwrap()
                    .unwrap();
                (doc.status, item.status)
            })
            .collect();
        let running = statuses
            .iter()
            .filter(|s| **s == (DocumentStatus::Processing, QueueStatus::Processing))
            .count();
        let waiting = statuses
            .iter()
            .filter(|s| **s == (DocumentStatus::Uploaded, QueueStatus::Pending))
            .count();
        assert_eq!((running, waiting), (1, 1), "unexpected states: {statuses:?}");
        assert_eq!(service.in_flight_count(), 2);

        service.wait_for_runs().await;
        for accepted in [&first, &second] {
            let doc = service.store.get_document(&accepted.document_id).unwrap().unwrap();
            assert_eq!(doc.status, DocumentStatus::Completed);
        }
        assert_eq!(service.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_runs_after_grace() {
        let mut config = test_config();
        config.processing.shutdown_grace_secs = 0;
        let service = service_with_config(
            config,
            slow_ai(Duration::from_secs(30)),
            Arc::new(FakeStorage::default()),
        );

        let accepted = service.accept_upload("alice", upload("stuck")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.in_flight_documents("alice"), vec![accepted.document_id.clone()]);

        tokio::time::timeout(Duration::from_secs(5), service.shutdown())
            .await
            .unwrap();
        assert_eq!(service.in_flight_count(), 0);

        // The run stops at its last checkpoint without being marked failed
        let doc = service.store.get_document(&accepted.document_id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert!(doc.processing_error.is_none());
        let item = service
            .store
            .get_latest_queue_item(&accepted.document_id)
            .unwrap()
            .unwrap();
        assert_eq!(item.status, QueueStatus::Processing);
        assert_eq!(item.progress, 10);
    }
}
