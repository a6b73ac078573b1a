use std::convert::Infallible;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use shared::assistant::{ChatStreamEvent, categorize_query};
use shared::models::{ChatRequest, StatusResponse};
use tracing::{info, warn};

use super::errors::{failure_response, json_rejection_response, validation_error_response};
use super::observability::RequestContext;
use super::{AppState, CORS_ALLOWED_HEADERS, CORS_ALLOWED_METHODS, CORS_MAX_AGE_SECONDS};

const NO_QUERY_MESSAGE: &str = "No query provided";
pub(super) const CHAT_PATH: &str = "/api/chat";

pub(super) async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return json_rejection_response(rejection),
    };
    let Some(query) = non_blank(req.query.as_deref()) else {
        return validation_error_response(NO_QUERY_MESSAGE);
    };

    let mut response = match state.assistant.answer(query, req.include_history).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(failure) => failure_response(failure),
    };
    response.extensions_mut().insert(categorize_query(query));
    response
}

/// Relays the answer as SSE: `fragment` events while the upstream streams, then exactly one
/// `complete` or `error` event carrying the JSON record.
pub(super) async fn chat_stream(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return json_rejection_response(rejection),
    };
    let Some(query) = non_blank(req.query.as_deref()) else {
        return validation_error_response(NO_QUERY_MESSAGE);
    };

    info!(request_id = %request_context.request_id, "opening assistant stream");
    let events = state
        .assistant
        .clone()
        .answer_stream(query.to_string(), req.include_history)
        .map(|event| Ok::<_, Infallible>(sse_event(event)));

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    response.extensions_mut().insert(categorize_query(query));
    response
}

pub(super) async fn clear_history(State(state): State<AppState>) -> impl IntoResponse {
    state.assistant.clear_history();
    (StatusCode::OK, Json(StatusResponse::success()))
}

/// Answers every `OPTIONS /api/chat` with 204 before the CORS layer sees it, preflight or not.
/// Other requests pass through untouched.
pub(super) async fn chat_preflight_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS && req.uri().path() == CHAT_PATH {
        return preflight_response(&state.allowed_origins, req.headers());
    }
    next.run(req).await
}

fn preflight_response(allowed_origins: &[String], headers: &HeaderMap) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::VARY, HeaderValue::from_static("origin"));

    if let Some(origin) = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .filter(|origin| allowed_origins.iter().any(|allowed| allowed == origin))
        && let Ok(value) = HeaderValue::from_str(origin)
    {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        response_headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }

    if let Ok(value) = HeaderValue::from_str(&join_header_list(
        CORS_ALLOWED_METHODS.iter().map(|method| method.as_str()),
    )) {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
    }
    if let Ok(value) = HeaderValue::from_str(&join_header_list(
        CORS_ALLOWED_HEADERS.iter().map(|name| name.as_str()),
    )) {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
    }
    response_headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from(CORS_MAX_AGE_SECONDS),
    );

    response
}

fn sse_event(event: ChatStreamEvent) -> Event {
    match event {
        // SSE data may not carry carriage returns; line feeds become separate data lines.
        ChatStreamEvent::Fragment(text) => Event::default()
            .event("fragment")
            .data(text.replace('\r', "")),
        ChatStreamEvent::Completed(response) => json_event("complete", &response),
        ChatStreamEvent::Failed(failure) => json_event("error", &failure),
    }
}

fn json_event<T: serde::Serialize>(name: &'static str, payload: &T) -> Event {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize stream event");
            Event::default()
                .event("error")
                .data("Error processing query: response could not be encoded")
        }
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn join_header_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
