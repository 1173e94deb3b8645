//! API key authentication.
//!
//! Clients send `Authorization: Bearer <key>`. The SHA-256 hex digest of the
//! key is matched against `auth.api_keys`; only digests are configured.

use axum::extract::{FromRequestParts, Query};
use axum::http::Uri;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::config::ApiKeyConfig;
use crate::error::ServiceError;

/// The authenticated user a request runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state).await.ok_or(ServiceError::Unauthorized)?;
        authenticate(&token, &state.service.config.auth.api_keys)
    }
}

/// Principal for the WebSocket upgrade, which also accepts `?access_token=`
/// since browsers cannot set headers on upgrade requests
#[derive(Debug, Clone)]
pub struct WsPrincipal(pub Principal);

impl FromRequestParts<Arc<AppState>> for WsPrincipal {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts, state).await {
            Some(token) => token,
            None => query_access_token(&parts.uri).ok_or(ServiceError::Unauthorized)?,
        };
        authenticate(&token, &state.service.config.auth.api_keys).map(WsPrincipal)
    }
}

async fn bearer_token(parts: &mut Parts, state: &Arc<AppState>) -> Option<String> {
    TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
        .await
        .ok()
        .map(|TypedHeader(header)| header.token().to_string())
}

#[derive(Debug, Deserialize)]
struct AccessTokenParams {
    access_token: Option<String>,
}

fn query_access_token(uri: &Uri) -> Option<String> {
    Query::<AccessTokenParams>::try_from_uri(uri)
        .ok()
        .and_then(|Query(params)| params.access_token)
        .filter(|token| !token.is_empty())
}

fn authenticate(token: &str, keys: &[ApiKeyConfig]) -> Result<Principal, ServiceError> {
    let digest = format!("{:x}", Sha256::digest(token.as_bytes()));
    keys.iter()
        .find(|key| key.key_sha256.trim().eq_ignore_ascii_case(&digest))
        .map(|key| Principal {
            user_id: key.user_id.clone(),
        })
        .ok_or_else(|| {
            debug!("Rejected unknown API key");
            ServiceError::Unauthorized
        })
}
