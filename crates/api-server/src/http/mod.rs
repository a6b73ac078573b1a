use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::assistant::GlpAssistant;
use shared::profile::ProfileExtractor;
use shared::vision::FoodAnalyzer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

mod analyze;
mod chat;
mod errors;
mod health;
mod observability;
mod profile;

pub(crate) const CORS_MAX_AGE_SECONDS: u64 = 600;
pub(crate) const CORS_ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];
pub(crate) const CORS_ALLOWED_HEADERS: [header::HeaderName; 2] =
    [header::CONTENT_TYPE, header::AUTHORIZATION];

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<GlpAssistant>,
    pub analyzer: Arc<FoodAnalyzer>,
    pub profiles: Arc<ProfileExtractor>,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

pub fn build_router(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.allowed_origins);
    let max_upload_bytes = app_state.max_upload_bytes;
    let preflight_state = app_state.clone();

    Router::new()
        .route("/api/health", get(health::health))
        .route(chat::CHAT_PATH, post(chat::chat))
        .route("/api/chat/stream", post(chat::chat_stream))
        .route("/api/chat/clear", post(chat::clear_history))
        .route("/api/analyze-food", post(analyze::analyze_food))
        .route("/api/calculator", post(analyze::calculator))
        .route("/api/profile/personal", post(profile::personal_profile))
        .route("/api/profile/medical", post(profile::medical_profile))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(middleware::from_fn_with_state(
            preflight_state,
            chat::chat_preflight_middleware,
        ))
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "skipping unusable cors origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(CORS_ALLOWED_METHODS)
        .allow_headers(CORS_ALLOWED_HEADERS)
        .expose_headers(CORS_ALLOWED_HEADERS)
        .allow_credentials(true)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECONDS))
}
