use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{
    ErrorResponse, FoodAnalysisResponse, ImageDataRequest, ResponseStatus, response_timestamp,
};
use shared::vision::decode_data_url;
use tracing::{debug, warn};

use super::AppState;
use super::errors::{failure_response, json_rejection_response, validation_error_response};
use super::observability::RequestContext;

const IMAGE_FIELD: &str = "image";

pub(super) async fn analyze_food(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected multipart request");
            return validation_error_response("No image file provided");
        }
    };

    let image_bytes = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(IMAGE_FIELD) => match field.bytes().await {
                Ok(bytes) => break bytes,
                Err(err) => {
                    warn!(error = %err, "failed to read uploaded image");
                    return validation_error_response("Invalid image upload");
                }
            },
            Ok(Some(_)) => continue,
            Ok(None) => return validation_error_response("No image file provided"),
            Err(err) => {
                warn!(error = %err, "failed to read multipart payload");
                return validation_error_response("Invalid image upload");
            }
        }
    };

    if image_bytes.is_empty() {
        return validation_error_response("No image file provided");
    }

    run_analysis(&state, &request_context, image_bytes.to_vec()).await
}

pub(super) async fn calculator(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    payload: Result<Json<ImageDataRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return json_rejection_response(rejection),
    };
    let Some(image) = req.image.filter(|image| !image.trim().is_empty()) else {
        return validation_error_response("No image data provided");
    };

    let image_bytes = match decode_data_url(&image) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(error = %err, "rejected image data url");
            return validation_error_response("Invalid image data");
        }
    };

    run_analysis(&state, &request_context, image_bytes).await
}

async fn run_analysis(
    state: &AppState,
    request_context: &RequestContext,
    image_bytes: Vec<u8>,
) -> Response {
    debug!(
        request_id = %request_context.request_id,
        upload_bytes = image_bytes.len(),
        "analysing food image"
    );

    match state.analyzer.analyze(image_bytes).await {
        Ok(report) => (
            StatusCode::OK,
            Json(FoodAnalysisResponse {
                status: ResponseStatus::Success,
                category: report.category,
                confidence: report.confidence,
                analysis: report.analysis,
                timestamp: response_timestamp(),
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(
                request_id = %request_context.request_id,
                error = %err,
                "food image analysis failed"
            );
            failure_response(ErrorResponse::new(
                err.kind(),
                format!("Error analyzing image: {err}"),
            ))
        }
    }
}
