//! Usage analytics endpoint.

use axum::{Json, extract::State};
use std::sync::Arc;

use super::AppState;
use super::auth::Principal;
use crate::db::models::UserStats;
use crate::error::ServiceError;

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<UserStats>, ServiceError> {
    Ok(Json(state.service.user_stats(&principal.user_id)?))
}
