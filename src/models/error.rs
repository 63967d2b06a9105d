use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every failed presence request.
/// 400 for invalid ids or parameters, 503 when the presence store is unreachable.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}
