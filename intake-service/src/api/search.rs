//! Semantic search endpoint.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use super::auth::Principal;
use crate::error::ServiceError;
use crate::service::SearchHit;

/// Search request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchRequest {
    pub query: String,
    /// Maximum number of matches requested from the provider (default 10)
    pub limit: Option<usize>,
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, ServiceError> {
    let hits = state
        .service
        .search_documents(&principal.user_id, &request.query, request.limit)
        .await?;
    Ok(Json(hits))
}
