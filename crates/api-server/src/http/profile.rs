use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::ProfileRequest;

use super::AppState;
use super::errors::{json_rejection_response, validation_error_response};

const NO_INPUT_MESSAGE: &str = "No input provided";

pub(super) async fn personal_profile(
    State(state): State<AppState>,
    payload: Result<Json<ProfileRequest>, JsonRejection>,
) -> Response {
    let input = match profile_input(payload) {
        Ok(input) => input,
        Err(response) => return response,
    };

    let profile = state.profiles.extract_personal(&input).await;
    (StatusCode::OK, Json(profile)).into_response()
}

pub(super) async fn medical_profile(
    State(state): State<AppState>,
    payload: Result<Json<ProfileRequest>, JsonRejection>,
) -> Response {
    let input = match profile_input(payload) {
        Ok(input) => input,
        Err(response) => return response,
    };

    let profile = state.profiles.extract_medical(&input).await;
    (StatusCode::OK, Json(profile)).into_response()
}

fn profile_input(payload: Result<Json<ProfileRequest>, JsonRejection>) -> Result<String, Response> {
    let Json(req) = payload.map_err(json_rejection_response)?;
    req.input
        .map(|input| input.trim().to_string())
        .filter(|input| !input.is_empty())
        .ok_or_else(|| validation_error_response(NO_INPUT_MESSAGE))
}
