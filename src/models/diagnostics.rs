use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub store: String,
    pub n_push_rooms: u32,
    pub n_simulations: u32,
    pub n_cached_counts: u32,
}
