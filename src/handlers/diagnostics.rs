use crate::{models::DiagnosticsResponse, state::AppState};
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

/// Process-local presence diagnostics
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
) -> Json<DiagnosticsResponse> {

    let n_push_rooms = state.hub.room_count().await as u32;
    let n_simulations = state.simulator.active_count() as u32;
    let n_cached_counts = state.last_counts.entry_count() as u32;
    let store = state.tracker.store().name().to_string();

    info!(
        "Diagnostics: store: {}, push rooms: {}, simulations: {}, cached counts: {}",
        store,
        n_push_rooms,
        n_simulations,
        n_cached_counts
    );

    Json(DiagnosticsResponse {
        store,
        n_push_rooms,
        n_simulations,
        n_cached_counts,
    })
}
