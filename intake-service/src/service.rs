mod analytics;
mod catalog;
mod document_processing;
mod search;

pub use document_processing::{UploadAccepted, UploadRequest};
pub use search::SearchHit;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::ai::DocumentAi;
use crate::config::Config;
use crate::db::models::ModelPurpose;
use crate::error::ServiceResult;
use crate::object_storage::ObjectStorage;
use crate::store::DocumentStore;
use crate::websocket::WebSocketManager;

use document_processing::InFlightRun;

/// Main service coordinator
pub struct IntakeService {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub ai: Arc<dyn DocumentAi>,
    pub storage: Arc<dyn ObjectStorage>,
    pub ws_manager: Arc<WebSocketManager>,
    /// Supervisor for background pipeline runs
    tracker: TaskTracker,
    /// Runs that have been spawned and not yet finished, keyed by document id
    in_flight: DashMap<String, InFlightRun>,
    run_permits: Arc<Semaphore>,
}

impl IntakeService {
    /// Create a new service instance from already constructed collaborators
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        ai: Arc<dyn DocumentAi>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        info!(
            max_concurrent_runs = config.processing.max_concurrent_runs,
            "Initializing document intake service"
        );

        let run_permits = Arc::new(Semaphore::new(config.processing.max_concurrent_runs));

        Self {
            config,
            store,
            ai,
            storage,
            ws_manager: Arc::new(WebSocketManager::new()),
            tracker: TaskTracker::new(),
            in_flight: DashMap::new(),
            run_permits,
        }
    }

    /// Model to use for a purpose: the user's active configuration, else the default
    pub(crate) fn model_for(&self, user_id: &str, purpose: ModelPurpose) -> ServiceResult<String> {
        if let Some(config) = self.store.active_model_config(user_id, purpose)? {
            return Ok(config.model);
        }
        Ok(match purpose {
            ModelPurpose::Ocr => self.config.ai.ocr_model.clone(),
            ModelPurpose::Embedding => self.config.ai.embedding_model.clone(),
        })
    }
}
