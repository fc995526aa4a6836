use crate::config::ApiConfig;
use crate::error::Error;
use crate::label_store::LabelStore;
use crate::query_service::{Action, QueryService, ServiceResponse};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
    pub label_store: Arc<dyn LabelStore>,
}

/// Query/delete request body
#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    pub action: String,
    pub key: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

impl From<Error> for ErrorResponse {
    fn from(e: Error) -> Self {
        Self {
            code: e.code().to_string(),
            error: e.to_string(),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/images", post(handle_request))
        .route("/api/v1/images/*key", delete(delete_image))
        .route("/api/v1/labels/*key", get(get_labels))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "labeler"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.label_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Action-style entry point: `{"action": "getLabels" | "deleteImage", "key": ...}`
#[instrument(skip(state))]
async fn handle_request(
    State(state): State<AppState>,
    Json(request): Json<ServiceRequest>,
) -> Result<Json<ServiceResponse>, ApiError> {
    state
        .query_service
        .handle(&request.action, &request.key)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, action = %request.action, "Rejected request");
            (StatusCode::BAD_REQUEST, Json(e.into()))
        })
}

#[instrument(skip(state))]
async fn get_labels(State(state): State<AppState>, Path(key): Path<String>) -> impl IntoResponse {
    Json(state.query_service.execute(Action::GetLabels, &key).await)
}

#[instrument(skip(state))]
async fn delete_image(State(state): State<AppState>, Path(key): Path<String>) -> impl IntoResponse {
    Json(state.query_service.execute(Action::DeleteImage, &key).await)
}

/// Start the query/delete API server
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting query/delete API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
