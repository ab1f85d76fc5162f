use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// `{"error": ...}` body used by the auth routes and the token gate.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// `{"message": ...}` body used by the analysis routes.
pub fn message_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}

/// Logs the full error chain and hides it from the client.
pub fn internal_response(err: &anyhow::Error) -> Response {
    error!(error = ?err, "internal error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
