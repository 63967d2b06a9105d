use axum::{extract::{Path, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{ErrorResponse, SimulationStartResponse, SimulationStatusResponse};
use crate::state::AppState;
use super::presence_failure;

/// Start synthetic presence for a moment. A held lock is reported, not an error.
pub async fn simulation_start(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
) -> Result<(StatusCode, Json<SimulationStartResponse>), (StatusCode, Json<ErrorResponse>)> {
    let outcome = state.simulator.start_for_moment(&moment_id).await.map_err(|e| {
        error!("Failed to start simulation for moment '{}': {}", moment_id, e);
        presence_failure(&e)
    })?;

    info!("Simulation start for moment '{}': {}", moment_id, outcome.as_str());
    Ok((
        StatusCode::ACCEPTED,
        Json(SimulationStartResponse {
            outcome: outcome.as_str().to_string(),
        }),
    ))
}

/// Stop synthetic presence for a moment
pub async fn simulation_stop(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.simulator.stop_for_moment(&moment_id).await.map_err(|e| {
        error!("Failed to stop simulation for moment '{}': {}", moment_id, e);
        presence_failure(&e)
    })?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn simulation_status(
    State(state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
) -> Json<SimulationStatusResponse> {
    Json(SimulationStatusResponse {
        running: state.simulator.is_running(&moment_id),
    })
}
