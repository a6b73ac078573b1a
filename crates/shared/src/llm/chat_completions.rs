use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmStreamFuture, LlmTokenUsage,
};
use super::stream::{fragment_stream, map_transport_error};

/// Settings for one OpenAI-compatible `/chat/completions` provider.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    pub chat_completions_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
}

#[derive(Debug, Error)]
pub enum ChatCompletionsBuildError {
    #[error("failed to build chat completions http client: {0}")]
    HttpClient(String),
}

#[derive(Clone)]
pub struct ChatCompletionsGateway {
    client: reqwest::Client,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsGateway {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, ChatCompletionsBuildError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ChatCompletionsBuildError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_body(&self, request: &LlmGatewayRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": request.messages,
        });

        if let Some(temperature) = request.temperature.or(self.config.temperature) {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens.or(self.config.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(&self.config.chat_completions_url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
    }

    async fn generate_with_retries(
        &self,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, LlmGatewayError> {
        let body = self.request_body(request, false);
        let mut attempt = 0_u32;

        loop {
            match self.send_once(&body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if err.retryable && attempt < self.config.max_retries {
                        let backoff_multiplier = 2_u64.saturating_pow(attempt);
                        let backoff_ms = self
                            .config
                            .retry_base_backoff_ms
                            .saturating_mul(backoff_multiplier);
                        debug!(
                            model = %self.config.model,
                            attempt,
                            backoff_ms,
                            error = %err.error,
                            "retrying chat completion"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }

                    return Err(err.error);
                }
            }
        }
    }

    async fn send_once(&self, body: &Value) -> Result<LlmGatewayResponse, SendAttemptError> {
        let response = self
            .post(body)
            .await
            .map_err(|err| SendAttemptError::retryable(map_transport_error(&err)))?;

        let status = response.status();
        let header_request_id = header_request_id(response.headers());
        let body = response.text().await.map_err(|err| {
            if err.is_timeout() {
                SendAttemptError::retryable(LlmGatewayError::Timeout)
            } else {
                SendAttemptError::non_retryable(LlmGatewayError::InvalidProviderPayload(
                    "response_body_read_failed".to_string(),
                ))
            }
        })?;

        if !status.is_success() {
            return Err(SendAttemptError {
                error: provider_status_error(status, &body),
                retryable: is_retryable_status(status),
            });
        }

        let parsed: ChatCompletionsSuccessResponse = serde_json::from_str(&body).map_err(|_| {
            SendAttemptError::non_retryable(LlmGatewayError::InvalidProviderPayload(
                "response_json_parse_failed".to_string(),
            ))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                SendAttemptError::non_retryable(LlmGatewayError::InvalidProviderPayload(
                    "missing_choice".to_string(),
                ))
            })?
            .message
            .content;

        let content = match content {
            Value::String(text) => text,
            _ => {
                return Err(SendAttemptError::non_retryable(
                    LlmGatewayError::InvalidProviderPayload(
                        "unsupported_content_shape".to_string(),
                    ),
                ));
            }
        };

        Ok(LlmGatewayResponse {
            model: parsed
                .model
                .unwrap_or_else(|| self.config.model.to_string()),
            provider_request_id: header_request_id.or(parsed.id),
            content,
            usage: parsed.usage.map(|usage| LlmTokenUsage {
                prompt_tokens: clamp_u64_to_u32(usage.prompt_tokens.unwrap_or(0)),
                completion_tokens: clamp_u64_to_u32(usage.completion_tokens.unwrap_or(0)),
                total_tokens: clamp_u64_to_u32(usage.total_tokens.unwrap_or(0)),
            }),
        })
    }
}

impl LlmGateway for ChatCompletionsGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            let result = self.generate_with_retries(&request).await;
            if let Err(err) = &result {
                warn!(model = %self.config.model, error = %err, "chat completion failed");
            }
            result
        })
    }

    fn generate_stream<'a>(&'a self, request: LlmGatewayRequest) -> LlmStreamFuture<'a> {
        Box::pin(async move {
            let body = self.request_body(&request, true);
            let response = self
                .post(&body)
                .await
                .map_err(|err| map_transport_error(&err))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = provider_status_error(status, &body);
                warn!(model = %self.config.model, error = %err, "streaming chat completion rejected");
                return Err(err);
            }

            Ok(fragment_stream(response))
        })
    }
}

#[derive(Debug)]
struct SendAttemptError {
    error: LlmGatewayError,
    retryable: bool,
}

impl SendAttemptError {
    fn retryable(error: LlmGatewayError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn non_retryable(error: LlmGatewayError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsSuccessResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<ChatCompletionsChoice>,
    usage: Option<ChatCompletionsUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsChoice {
    message: ChatCompletionsMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsMessage {
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn provider_status_error(status: StatusCode, body: &str) -> LlmGatewayError {
    let provider_code = parse_provider_error_code(body);
    LlmGatewayError::ProviderFailure(format!(
        "status={} code={provider_code}",
        status.as_u16()
    ))
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn header_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn parse_provider_error_code(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorDetails {
        code: Option<Value>,
        #[serde(rename = "type")]
        kind: Option<String>,
    }

    let parsed = serde_json::from_str::<ProviderErrorEnvelope>(body).ok();
    let Some(details) = parsed.and_then(|envelope| envelope.error) else {
        return "unknown".to_string();
    };

    match details.code {
        Some(Value::String(code)) => code,
        Some(Value::Number(code)) => code.to_string(),
        _ => details.kind.unwrap_or_else(|| "unknown".to_string()),
    }
}

fn clamp_u64_to_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}
