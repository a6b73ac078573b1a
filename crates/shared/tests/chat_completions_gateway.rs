use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use shared::llm::{
    ChatCompletionsConfig, ChatCompletionsGateway, ChatMessage, LlmGateway, LlmGatewayError,
    LlmGatewayRequest, StreamEvent, collect_fragments,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

#[derive(Debug, Clone)]
struct MockReply {
    status: StatusCode,
    content_type: &'static str,
    body: String,
    delay: Option<Duration>,
}

impl MockReply {
    fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
            delay: None,
        }
    }

    fn event_stream(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/event-stream",
            body: body.to_string(),
            delay: None,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
struct TestServerState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    seen_bodies: Arc<Mutex<Vec<Value>>>,
    seen_auth_headers: Arc<Mutex<Vec<String>>>,
}

impl TestServerState {
    fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen_bodies: Arc::new(Mutex::new(Vec::new())),
            seen_auth_headers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tokio::test]
async fn blocking_call_returns_first_choice_content_and_sends_configured_budget() {
    let state = TestServerState::with_replies(vec![MockReply::json(
        StatusCode::OK,
        success_response_body("  X \n"),
    )]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 0)).expect("gateway should build");
    let response = gateway
        .generate(question_request())
        .await
        .expect("blocking call should succeed");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(response.content.trim(), "X");
    assert_eq!(response.model, "sonar-test");
    assert_eq!(response.provider_request_id.as_deref(), Some("cmpl-1"));
    assert_eq!(response.usage.map(|usage| usage.total_tokens), Some(20));

    let seen_bodies = state.seen_bodies.lock().await.clone();
    assert_eq!(seen_bodies.len(), 1);
    let body = &seen_bodies[0];
    assert_eq!(body["model"], gateway.model());
    assert_eq!(gateway.model(), "test-model");
    assert_eq!(body["max_tokens"], 1500);
    assert!((body["temperature"].as_f64().expect("temperature is a number") - 0.1).abs() < 1e-6);
    assert!(body.get("stream").is_none());
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "How should I store my pen?");

    let seen_auth_headers = state.seen_auth_headers.lock().await.clone();
    assert_eq!(seen_auth_headers, vec!["Bearer test-key".to_string()]);
}

#[tokio::test]
async fn non_success_status_surfaces_provider_failure() {
    let state = TestServerState::with_replies(vec![MockReply::json(
        StatusCode::UNAUTHORIZED,
        json!({ "error": { "code": "invalid_api_key" } }),
    )]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 2)).expect("gateway should build");
    let err = gateway
        .generate(question_request())
        .await
        .expect_err("unauthorized should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        err,
        LlmGatewayError::ProviderFailure("status=401 code=invalid_api_key".to_string())
    );
    assert_eq!(
        state.seen_bodies.lock().await.len(),
        1,
        "non-retryable statuses must not be retried"
    );
}

#[tokio::test]
async fn retries_transient_failures_before_succeeding() {
    let state = TestServerState::with_replies(vec![
        MockReply::json(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": { "code": "overloaded" } }),
        ),
        MockReply::json(StatusCode::OK, success_response_body("recovered")),
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 1)).expect("gateway should build");
    let response = gateway
        .generate(question_request())
        .await
        .expect("request should succeed after retry");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(response.content, "recovered");
    assert_eq!(state.seen_bodies.lock().await.len(), 2);
}

#[tokio::test]
async fn missing_choice_is_an_invalid_payload() {
    let state = TestServerState::with_replies(vec![MockReply::json(
        StatusCode::OK,
        json!({ "choices": [] }),
    )]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 0)).expect("gateway should build");
    let err = gateway
        .generate(question_request())
        .await
        .expect_err("empty choices should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        err,
        LlmGatewayError::InvalidProviderPayload("missing_choice".to_string())
    );
}

#[tokio::test]
async fn slow_provider_maps_to_timeout() {
    let state = TestServerState::with_replies(vec![
        MockReply::json(StatusCode::OK, success_response_body("too late"))
            .delayed(Duration::from_millis(800)),
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let mut config = config_for(url, 0);
    config.timeout_ms = 100;
    let gateway = ChatCompletionsGateway::new(config).expect("gateway should build");
    let err = gateway
        .generate(question_request())
        .await
        .expect_err("slow provider should time out");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[tokio::test]
async fn streaming_call_accumulates_fragments_until_terminator() {
    let body = [
        sse_delta("Hello ", None),
        ": keep-alive\n\n".to_string(),
        sse_delta("world", None),
        sse_delta("", Some("stop")),
        "data: [DONE]\n\n".to_string(),
    ]
    .concat();
    let state = TestServerState::with_replies(vec![MockReply::event_stream(&body)]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 0)).expect("gateway should build");
    let fragments = gateway
        .generate_stream(question_request())
        .await
        .expect("stream should open");
    let accumulated = collect_fragments(fragments)
        .await
        .expect("stream should complete");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(accumulated, "Hello world");
    let seen_bodies = state.seen_bodies.lock().await.clone();
    assert_eq!(seen_bodies[0]["stream"], true);
}

#[tokio::test]
async fn streaming_yields_fragments_in_order_then_done() {
    let body = [
        sse_delta("a", None),
        sse_delta("b", None),
        "data: [DONE]\n\n".to_string(),
        sse_delta("after-done", None),
    ]
    .concat();
    let state = TestServerState::with_replies(vec![MockReply::event_stream(&body)]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 0)).expect("gateway should build");
    let mut fragments = gateway
        .generate_stream(question_request())
        .await
        .expect("stream should open");

    let mut events = Vec::new();
    while let Some(event) = futures::StreamExt::next(&mut fragments).await {
        events.push(event.expect("events should decode"));
    }

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        events,
        vec![
            StreamEvent::Fragment("a".to_string()),
            StreamEvent::Fragment("b".to_string()),
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn malformed_stream_chunk_aborts_the_stream() {
    let body = [sse_delta("partial", None), "data: {broken\n\n".to_string()].concat();
    let state = TestServerState::with_replies(vec![MockReply::event_stream(&body)]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 0)).expect("gateway should build");
    let fragments = gateway
        .generate_stream(question_request())
        .await
        .expect("stream should open");
    let err = collect_fragments(fragments)
        .await
        .expect_err("malformed chunk should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        err,
        LlmGatewayError::InvalidProviderPayload("malformed_stream_chunk".to_string())
    );
}

#[tokio::test]
async fn streaming_rejection_fails_before_any_fragment() {
    let state = TestServerState::with_replies(vec![MockReply::json(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "error": { "type": "rate_limit_error" } }),
    )]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state).await;

    let gateway = ChatCompletionsGateway::new(config_for(url, 3)).expect("gateway should build");
    let result = gateway.generate_stream(question_request()).await;

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    match result {
        Err(err) => assert_eq!(
            err,
            LlmGatewayError::ProviderFailure("status=429 code=rate_limit_error".to_string())
        ),
        Ok(_) => panic!("rate limited stream should not open"),
    }
}

fn question_request() -> LlmGatewayRequest {
    LlmGatewayRequest::new(vec![
        ChatMessage::system("You answer GLP-1 questions."),
        ChatMessage::user("How should I store my pen?"),
    ])
}

fn config_for(chat_completions_url: String, max_retries: u32) -> ChatCompletionsConfig {
    ChatCompletionsConfig {
        chat_completions_url,
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
        temperature: Some(0.1),
        max_tokens: Some(1500),
        timeout_ms: 5_000,
        max_retries,
        retry_base_backoff_ms: 0,
    }
}

fn success_response_body(content: &str) -> Value {
    json!({
        "id": "cmpl-1",
        "model": "sonar-test",
        "choices": [
            {
                "message": {
                    "role": "assistant",
                    "content": content
                }
            }
        ],
        "usage": {
            "prompt_tokens": 12,
            "completion_tokens": 8,
            "total_tokens": 20
        }
    })
}

fn sse_delta(content: &str, finish_reason: Option<&str>) -> String {
    let chunk = json!({
        "choices": [
            {
                "delta": { "content": content },
                "finish_reason": finish_reason
            }
        ]
    });
    format!("data: {chunk}\n\n")
}

async fn spawn_test_server(
    state: TestServerState,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/chat/completions", post(test_chat_completions_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let local_addr = listener
        .local_addr()
        .expect("listener address should resolve");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        server.await.expect("test server should run");
    });

    (
        format!("http://{local_addr}/chat/completions"),
        shutdown_tx,
        server_task,
    )
}

async fn test_chat_completions_handler(
    State(state): State<TestServerState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    state.seen_bodies.lock().await.push(payload);

    if let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
    {
        state.seen_auth_headers.lock().await.push(value.to_string());
    }

    let reply = state.replies.lock().await.pop_front().unwrap_or(MockReply::json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "code": "exhausted_test_replies" } }),
    ));

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    (
        reply.status,
        [(header::CONTENT_TYPE, reply.content_type)],
        reply.body,
    )
        .into_response()
}
