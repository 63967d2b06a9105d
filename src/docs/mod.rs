use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Presence store reachable", body = ReadyResponse),
        (status = 503, description = "Presence store unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Enter a moment
#[utoipa::path(
    post,
    path = "/api/moments/{moment_id}/join",
    params(("moment_id" = String, Path, description = "Moment or mood room id")),
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Fresh participant count", body = PresenceCountResponse),
        (status = 400, description = "Empty participant id", body = ErrorResponse),
        (status = 503, description = "Presence store unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn presence_join_doc() {}

/// Leave a moment
#[utoipa::path(
    post,
    path = "/api/moments/{moment_id}/leave",
    params(("moment_id" = String, Path, description = "Moment or mood room id")),
    request_body = PresenceRequest,
    responses(
        (status = 200, description = "Remaining participant count", body = PresenceCountResponse),
        (status = 503, description = "Presence store unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn presence_leave_doc() {}

/// Current participant count
#[utoipa::path(
    get,
    path = "/api/moments/{moment_id}/presence",
    params(("moment_id" = String, Path, description = "Moment or mood room id")),
    responses(
        (status = 200, description = "Participant count, possibly last known", body = PresenceCountResponse),
        (status = 503, description = "Presence store unavailable and nothing cached", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn presence_count_doc() {}

/// Window analytics
#[utoipa::path(
    get,
    path = "/api/moments/{moment_id}/presence/stats",
    params(("moment_id" = String, Path, description = "Moment or mood room id"), StatsQuery),
    responses(
        (status = 200, description = "Peak and approximate unique visitors", body = WindowStatsResponse),
        (status = 400, description = "Malformed window", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn presence_stats_doc() {}

/// Start presence simulation
#[utoipa::path(
    post,
    path = "/api/moments/{moment_id}/simulation/start",
    params(("moment_id" = String, Path, description = "Moment or mood room id")),
    responses(
        (status = 202, description = "Start outcome", body = SimulationStartResponse)
    )
)]
#[allow(dead_code)]
pub async fn simulation_start_doc() {}

/// Stop presence simulation
#[utoipa::path(
    post,
    path = "/api/moments/{moment_id}/simulation/stop",
    params(("moment_id" = String, Path, description = "Moment or mood room id")),
    responses(
        (status = 202, description = "Simulation stopped and lock released")
    )
)]
#[allow(dead_code)]
pub async fn simulation_stop_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        presence_join_doc,
        presence_leave_doc,
        presence_count_doc,
        presence_stats_doc,
        simulation_start_doc,
        simulation_stop_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            ErrorResponse,
            PresenceRequest,
            PresenceCountResponse,
            WindowStatsResponse,
            SimulationStartResponse,
            SimulationStatusResponse,
            DiagnosticsResponse,
        )
    ),
    tags(
        (name = "presence", description = "Presence endpoints")
    )
)]
pub struct ApiDoc;
