//! Category API endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use super::auth::Principal;
use super::double_option;
use crate::db::models::{Category, CategoryUpdate, NewCategory};
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Partial update; `null` clears description or color
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCategoryRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
}

pub async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<Category>>, ServiceError> {
    Ok(Json(state.service.list_categories(&principal.user_id)?))
}

pub async fn create_category_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ServiceError> {
    let category = state.service.create_category(NewCategory {
        user_id: principal.user_id,
        name: request.name,
        description: request.description,
        color: request.color,
    })?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Category>, ServiceError> {
    Ok(Json(state.service.get_owned_category(&principal.user_id, &id)?))
}

pub async fn update_category_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ServiceError> {
    let category = state.service.update_category(
        &principal.user_id,
        &id,
        CategoryUpdate {
            name: request.name,
            description: request.description,
            color: request.color,
        },
    )?;
    Ok(Json(category))
}

pub async fn delete_category_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_category(&principal.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
