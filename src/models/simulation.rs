use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of a simulation start request
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SimulationStartResponse {
    /// One of `started`, `already_running`, `disabled`
    pub outcome: String,
}

/// Whether this replica drives the moment's simulation
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SimulationStatusResponse {
    pub running: bool,
}
