use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Request body for joining or leaving a moment
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRequest {
    pub user_id: String,
}

/// Current number of participants in a moment
#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct PresenceCountResponse {
    pub count: u64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// RFC 3339 timestamp inside the wanted window; defaults to now
    pub window: Option<String>,
}

/// Peak concurrency and approximate unique visitors of one window
#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WindowStatsResponse {
    pub window_start: String,
    pub peak: u64,
    pub unique: u64,
}
