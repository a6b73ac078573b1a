use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{ErrorKind, ErrorResponse};
use tracing::{debug, error};

pub(super) fn validation_error_response(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::validation(message)),
    )
        .into_response()
}

pub(super) fn json_rejection_response(rejection: JsonRejection) -> Response {
    debug!(error = %rejection.body_text(), "rejected request body");
    validation_error_response("Invalid JSON payload")
}

pub(super) fn failure_response(failure: ErrorResponse) -> Response {
    let status = status_for_kind(failure.kind);
    if status.is_server_error() {
        error!(kind = ?failure.kind, message = %failure.message, "request failed");
    }
    (status, Json(failure)).into_response()
}

fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Upstream | ErrorKind::Timeout | ErrorKind::Processing => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
