//! Model configuration API endpoints.

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
use crate::db::models::{ModelConfigUpdate, ModelConfiguration, ModelPurpose, NewModelConfig};
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateModelConfigRequest {
    pub name: String,
    pub purpose: ModelPurpose,
    pub model: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: bool,
}

/// Partial update; the purpose of a configuration is fixed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateModelConfigRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parameters: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub async fn list_model_configs_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<ModelConfiguration>>, ServiceError> {
    Ok(Json(state.service.list_model_configs(&principal.user_id)?))
}

pub async fn create_model_config_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(request): Json<CreateModelConfigRequest>,
) -> Result<(StatusCode, Json<ModelConfiguration>), ServiceError> {
    let config = state.service.create_model_config(NewModelConfig {
        user_id: principal.user_id,
        name: request.name,
        purpose: request.purpose,
        model: request.model,
        parameters: request.parameters,
        is_active: request.is_active,
    })?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn get_model_config_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<ModelConfiguration>, ServiceError> {
    Ok(Json(
        state
            .service
            .get_owned_model_config(&principal.user_id, &id)?,
    ))
}

pub async fn update_model_config_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateModelConfigRequest>,
) -> Result<Json<ModelConfiguration>, ServiceError> {
    let config = state.service.update_model_config(
        &principal.user_id,
        &id,
        ModelConfigUpdate {
            name: request.name,
            model: request.model,
            parameters: request.parameters,
            is_active: request.is_active,
        },
    )?;
    Ok(Json(config))
}

pub async fn delete_model_config_handler(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state
        .service
        .delete_model_config(&principal.user_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
