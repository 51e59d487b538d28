use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use hearth_common::HearthError;

/// Map a domain error to its HTTP shape: `{error, message}` with a 4xx for
/// client faults and a 5xx otherwise.
pub fn error_response(err: &HearthError) -> Response {
    let (status, error, message) = match err {
        HearthError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            "Validation error".to_string(),
            message.clone(),
        ),
        HearthError::BadRequest { error, message } => {
            (StatusCode::BAD_REQUEST, error.clone(), message.clone())
        }
        HearthError::Auth(message) => {
            (StatusCode::FORBIDDEN, "Forbidden".to_string(), message.clone())
        }
        HearthError::NotFound(message) => {
            (StatusCode::NOT_FOUND, "Not found".to_string(), message.clone())
        }
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error".to_string(),
            other.to_string(),
        ),
    };

    (
        status,
        Json(serde_json::json!({ "error": error, "message": message })),
    )
        .into_response()
}
