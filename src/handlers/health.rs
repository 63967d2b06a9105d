use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use crate::models::{ErrorResponse, HealthResponse, ReadyResponse};
use crate::state::AppState;
use crate::store::PresenceStore;
use tracing::{debug, error};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint, pings the presence store
pub async fn ready_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadyResponse>, (StatusCode, Json<ErrorResponse>)> {
    debug!("Readiness check requested");
    let store = state.tracker.store();
    if let Err(e) = store.ping().await {
        error!("Presence store is not reachable: {}", e);
        return Err(super::error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Presence store unavailable: {}", e),
        ));
    }
    Ok(Json(ReadyResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
        store: store.name().to_string(),
    }))
}
