//! Fixed JSON error envelopes for the API boundary (§6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// A validation or lookup failure surfaced directly to the caller,
/// before any lifecycle operation runs (§7 "Validation").
pub enum ApiError {
    /// A path segment failed `^[a-z0-9_\-]*$` (§3, §4.H).
    InvalidSegment,
    /// `challenge_id` is not in the catalogue (§4.H, §8 boundaries).
    UnknownChallenge(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidSegment => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": "path segments must match ^[a-z0-9_-]*$" })),
            )
                .into_response(),
            ApiError::UnknownChallenge(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": format!("Challenge '{id}' not found") })),
            )
                .into_response(),
        }
    }
}
