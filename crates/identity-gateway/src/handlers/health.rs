//! Health check endpoint.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

/// GET /v1/health
///
/// Reports service liveness and backing-store reachability. Returns 503
/// when the store is unreachable so load balancers stop routing here.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    if state.store.ping().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                database: Some("connected".to_string()),
            }),
        )
    } else {
        tracing::warn!(target: "idg.handlers.health", "Health check failed: store unreachable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                database: Some("disconnected".to_string()),
            }),
        )
    }
}
