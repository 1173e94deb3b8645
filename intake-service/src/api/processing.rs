//! Processing status endpoints.

use axum::{Json, extract::State};
use std::sync::Arc;

use super::AppState;
use super::auth::Principal;
use crate::db::models::ProcessingQueueItem;
use crate::error::ServiceError;

/// Queue items of the caller's documents that are currently processing
pub async fn active_processing_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<ProcessingQueueItem>>, ServiceError> {
    Ok(Json(state.service.active_processing(&principal.user_id)?))
}
