pub mod health;
pub mod presence;
pub mod simulation;
pub mod diagnostics;

pub use health::*;
pub use presence::*;
pub use simulation::*;
pub use diagnostics::*;

use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;
use crate::presence::PresenceError;

pub(crate) fn error_response(status: StatusCode, error: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error,
    }))
}

/// Invalid ids are the caller's fault; store failures are retryable.
pub(crate) fn presence_failure(e: &PresenceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        PresenceError::InvalidParticipant | PresenceError::InvalidRoom => StatusCode::BAD_REQUEST,
        PresenceError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, e.to_string())
}
