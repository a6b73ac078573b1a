use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use shared::models::StatusResponse;

pub(super) async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(StatusResponse::healthy()))
}
