//! HTTP API for the document intake service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Document upload, listing and deletion
//! - Processing status and analytics
//! - Semantic search
//! - Categories and model configurations
//! - WebSocket progress feed

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::IntakeService;
use crate::websocket::handle_ws_connection;

pub mod analytics;
pub mod auth;
pub mod categories;
pub mod documents;
pub mod model_configs;
pub mod processing;
pub mod search;

use analytics::stats_handler;
use auth::WsPrincipal;
use categories::{
    create_category_handler, delete_category_handler, get_category_handler,
    list_categories_handler, update_category_handler,
};
use documents::{
    delete_document_handler, get_document_handler, get_document_images_handler,
    get_document_processing_handler, get_document_vectors_handler, list_documents_handler,
    update_document_handler, upload_document_handler,
};
use model_configs::{
    create_model_config_handler, delete_model_config_handler, get_model_config_handler,
    list_model_configs_handler, update_model_config_handler,
};
use processing::active_processing_handler;
use search::search_handler;

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<IntakeService>,
    pub start_time: Instant,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<IntakeService>, metrics: Option<PrometheusHandle>) -> Router {
    let max_body_size =
        service.config.limits.max_upload_bytes as usize + MULTIPART_OVERHEAD_BYTES;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Document endpoints - with larger body limit for file uploads
        .route("/documents", get(list_documents_handler))
        .route(
            "/documents/upload",
            post(upload_document_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/documents/search", post(search_handler))
        .route(
            "/documents/{id}",
            get(get_document_handler)
                .patch(update_document_handler)
                .delete(delete_document_handler),
        )
        .route("/documents/{id}/images", get(get_document_images_handler))
        .route("/documents/{id}/vectors", get(get_document_vectors_handler))
        .route(
            "/documents/{id}/processing",
            get(get_document_processing_handler),
        )
        // Processing and analytics
        .route("/processing/active", get(active_processing_handler))
        .route("/analytics/stats", get(stats_handler))
        // Category endpoints
        .route(
            "/categories",
            get(list_categories_handler).post(create_category_handler),
        )
        .route(
            "/categories/{id}",
            get(get_category_handler)
                .put(update_category_handler)
                .delete(delete_category_handler),
        )
        // Model configuration endpoints
        .route(
            "/model-configs",
            get(list_model_configs_handler).post(create_model_config_handler),
        )
        .route(
            "/model-configs/{id}",
            get(get_model_config_handler)
                .put(update_model_config_handler)
                .delete(delete_model_config_handler),
        );

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Deserialize a field that distinguishes "absent" from "null": absent is
/// `None`, null is `Some(None)`. Pair with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        in_flight_runs: state.service.in_flight_count(),
        websocket_connections: state.service.ws_manager.connection_count(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    in_flight_runs: usize,
    websocket_connections: usize,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

// === WebSocket ===

async fn ws_handler(
    WsPrincipal(principal): WsPrincipal,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    info!(user_id = %principal.user_id, "WebSocket upgrade request received");
    let ws_manager = Arc::clone(&state.service.ws_manager);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, ws_manager, principal.user_id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sha2::{Digest, Sha256};
    use tower::ServiceExt;

    use crate::config::ApiKeyConfig;
    use crate::config::tests::test_config;
    use crate::service::testing::{FakeAi, FakeStorage};
    use crate::store::memory::MemoryStore;

    pub(crate) const ALICE_KEY: &str = "alice-secret";
    pub(crate) const BOB_KEY: &str = "bob-secret";

    fn key(user_id: &str, token: &str) -> ApiKeyConfig {
        ApiKeyConfig {
            user_id: user_id.to_string(),
            key_sha256: format!("{:x}", Sha256::digest(token.as_bytes())),
        }
    }

    /// Router over a memory store with fake providers and two users
    pub(crate) fn test_app() -> (Router, Arc<IntakeService>) {
        let mut config = test_config();
        config.auth.api_keys = vec![key("alice", ALICE_KEY), key("bob", BOB_KEY)];

        let service = Arc::new(IntakeService::new(
            Arc::new(config),
            Arc::new(MemoryStore::new()),
            Arc::new(FakeAi::default()),
            Arc::new(FakeStorage::default()),
        ));
        (router(Arc::clone(&service), None), service)
    }

    pub(crate) async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    pub(crate) fn authed(method: &str, uri: &str, token: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
    }

    pub(crate) fn json_request(method: &str, uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
        authed(method, uri, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _) = test_app();
        let (status, body) = send(
            &app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["inFlightRuns"], 0);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (app, _) = test_app();
        let (status, _) = send(
            &app,
            Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ws_requires_auth() {
        let (app, _) = test_app();
        let (status, body) = send(
            &app,
            Request::builder().uri("/ws").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");

        // A valid query token passes auth; the plain GET then fails the upgrade
        let (status, _) = send(
            &app,
            Request::builder()
                .uri(format!("/ws?access_token={}", ALICE_KEY))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        assert!(status.is_client_error());
    }

    #[test]
    fn test_double_option() {
        #[derive(Deserialize)]
        struct Patch {
            #[serde(default, deserialize_with = "double_option")]
            value: Option<Option<String>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.value, None);
        let null: Patch = serde_json::from_str(r#"{"value":null}"#).unwrap();
        assert_eq!(null.value, Some(None));
        let set: Patch = serde_json::from_str(r#"{"value":"x"}"#).unwrap();
        assert_eq!(set.value, Some(Some("x".to_string())));
    }
}
