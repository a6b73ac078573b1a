use std::sync::Arc;

use api_server::http::{AppState, build_router};
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use shared::assistant::{AssistantConfig, GlpAssistant};
use shared::llm::LlmGateway;
use shared::profile::ProfileExtractor;
use shared::vision::{FoodAnalyzer, ImageClassifier};
use tower::ServiceExt;

pub const ALLOWED_ORIGIN: &str = "http://localhost:3000";
pub const MULTIPART_BOUNDARY: &str = "glp-test-boundary";

pub struct TestApp {
    pub router: axum::Router,
    pub assistant: Arc<GlpAssistant>,
}

pub struct TestAppBuilder {
    assistant_gateway: Arc<dyn LlmGateway>,
    vision_gateway: Arc<dyn LlmGateway>,
    classifier: Option<Arc<dyn ImageClassifier>>,
    assistant_config: AssistantConfig,
    max_upload_bytes: usize,
}

impl TestAppBuilder {
    pub fn new(assistant_gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            vision_gateway: assistant_gateway.clone(),
            assistant_gateway,
            classifier: None,
            assistant_config: AssistantConfig::default(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }

    pub fn vision_gateway(mut self, gateway: Arc<dyn LlmGateway>) -> Self {
        self.vision_gateway = gateway;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ImageClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn assistant_config(mut self, config: AssistantConfig) -> Self {
        self.assistant_config = config;
        self
    }

    pub fn max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn build(self) -> TestApp {
        let assistant = Arc::new(GlpAssistant::new(
            self.assistant_gateway,
            self.assistant_config,
        ));
        let router = build_router(AppState {
            assistant: assistant.clone(),
            analyzer: Arc::new(FoodAnalyzer::new(
                self.vision_gateway.clone(),
                self.classifier,
                512,
            )),
            profiles: Arc::new(ProfileExtractor::new(self.vision_gateway)),
            allowed_origins: vec![
                ALLOWED_ORIGIN.to_string(),
                "https://glp-1-lovat.vercel.app".to_string(),
            ],
            max_upload_bytes: self.max_upload_bytes,
        });

        TestApp { router, assistant }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or_else(|_| json!({}))
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

pub async fn send(app: &axum::Router, request: Request<Body>) -> TestResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");

    TestResponse {
        status,
        headers,
        text: String::from_utf8_lossy(&body).into_owned(),
    }
}

pub fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub fn multipart_request(uri: &str, field_name: &str, file_bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"meal.png\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request should build")
}

/// `(event, data)` pairs from an SSE body; multi-line data is rejoined with `\n`.
pub fn sse_events(text: &str) -> Vec<(String, String)> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data.push(value);
                } else if line == "data:" {
                    data.push("");
                }
            }
            event.map(|event| (event, data.join("\n")))
        })
        .collect()
}
