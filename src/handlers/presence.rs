use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::{ErrorResponse, PresenceCountResponse, PresenceRequest, StatsQuery, WindowStatsResponse};
use crate::presence::window::{parse_window, window_label};
use crate::state::AppState;
use super::{error_response, presence_failure};

type HandlerResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorResponse>)>;

/// Enter a moment
pub async fn presence_join(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
    Json(request): Json<PresenceRequest>,
) -> HandlerResult<PresenceCountResponse> {
    let count = state
        .tracker
        .join(&moment_id, &request.user_id)
        .await
        .map_err(|e| {
            error!("Failed to join '{}' to moment '{}': {}", request.user_id, moment_id, e);
            presence_failure(&e)
        })?;

    state.record_count(&moment_id, count).await;
    Ok((StatusCode::OK, Json(PresenceCountResponse { count })))
}

/// Leave a moment
pub async fn presence_leave(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
    Json(request): Json<PresenceRequest>,
) -> HandlerResult<PresenceCountResponse> {
    let count = state
        .tracker
        .leave(&moment_id, &request.user_id)
        .await
        .map_err(|e| {
            error!("Failed to remove '{}' from moment '{}': {}", request.user_id, moment_id, e);
            presence_failure(&e)
        })?;

    state.record_count(&moment_id, count).await;
    Ok((StatusCode::OK, Json(PresenceCountResponse { count })))
}

/// Current participant count, degraded to the last known value when the store is down
pub async fn presence_count(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
) -> HandlerResult<PresenceCountResponse> {
    match state.tracker.count(&moment_id).await {
        Ok(count) => {
            state.last_counts.insert(moment_id, count);
            Ok((StatusCode::OK, Json(PresenceCountResponse { count })))
        }
        Err(e) => {
            let failure = presence_failure(&e);
            if failure.0 == StatusCode::SERVICE_UNAVAILABLE {
                if let Some(count) = state.last_counts.get(&moment_id) {
                    warn!("Serving cached count for moment '{}': {}", moment_id, e);
                    return Ok((StatusCode::OK, Json(PresenceCountResponse { count })));
                }
            }
            error!("Failed to count moment '{}': {}", moment_id, e);
            Err(failure)
        }
    }
}

/// Peak and unique visitors of an analytics window
pub async fn presence_stats(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> HandlerResult<WindowStatsResponse> {
    let window = match query.window.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => None,
        Some(raw) => match parse_window(raw, state.tracker.config().window_period) {
            Some(start) => Some(start),
            None => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid window '{}'. Use an RFC 3339 timestamp.", raw),
                ));
            }
        },
    };

    let stats = state.tracker.stats(&moment_id, window).await.map_err(|e| {
        error!("Failed to read stats for moment '{}': {}", moment_id, e);
        presence_failure(&e)
    })?;

    info!("Stats for moment '{}': peak {}, unique {}", moment_id, stats.peak, stats.unique);
    Ok((
        StatusCode::OK,
        Json(WindowStatsResponse {
            window_start: window_label(stats.window_start),
            peak: stats.peak,
            unique: stats.unique,
        }),
    ))
}
