//! Cancellation of in-flight runs.

use tracing::info;

use crate::service::IntakeService;

impl IntakeService {
    /// Cancel the unfinished run of a document, if there is one.
    /// A cancelled run writes nothing further.
    pub(crate) fn cancel_processing(&self, document_id: &str) -> bool {
        if let Some((_, run)) = self.in_flight.remove(document_id) {
            run.token.cancel();
            info!(
                doc_id = %document_id,
                queue_item_id = %run.queue_item_id,
                "Document processing cancellation triggered"
            );
            true
        } else {
            false
        }
    }

    /// Forget a run once it has finished
    pub(crate) fn finish_run(&self, document_id: &str) {
        self.in_flight.remove(document_id);
    }
}
