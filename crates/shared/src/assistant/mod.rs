//! GLP-1 question answering: categorisation, bounded conversation memory, prompt assembly
//! and normalisation of upstream output into [`ChatResponse`] / [`ErrorResponse`].

use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_stream::stream;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::prompts::GLP1_SYSTEM_PROMPT;
use crate::llm::{
    ChatMessage, LlmGateway, LlmGatewayError, LlmGatewayRequest, StreamEvent, collect_fragments,
};
use crate::models::{ChatResponse, ErrorKind, ErrorResponse, response_timestamp};

pub mod categorizer;
pub mod history;
pub mod prompt;
pub mod reply;

pub use categorizer::{QueryCategory, categorize_query};
pub use history::{ConversationHistory, DEFAULT_MAX_HISTORY_LENGTH, Exchange};
pub use prompt::assemble_messages;
pub use reply::{NO_SOURCES_PROVIDED, SourcedAnswer, split_sources};

/// How `/api/chat` talks to the provider; `/api/chat/stream` always streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMode {
    Blocking,
    Streaming,
}

impl FromStr for UpstreamMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "streaming" => Ok(Self::Streaming),
            other => Err(format!("unknown upstream mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub max_history_length: usize,
    pub upstream_mode: UpstreamMode,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            upstream_mode: UpstreamMode::Blocking,
        }
    }
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Please enter a valid question.")]
    EmptyQuery,
    #[error("Error processing query: {0}")]
    Upstream(#[from] LlmGatewayError),
}

impl AssistantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery => ErrorKind::Validation,
            Self::Upstream(err) if err.is_timeout() => ErrorKind::Timeout,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChatStreamEvent {
    Fragment(String),
    Completed(ChatResponse),
    Failed(ErrorResponse),
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatStreamEvent> + Send>>;

pub struct GlpAssistant {
    gateway: Arc<dyn LlmGateway>,
    config: AssistantConfig,
    history: Mutex<ConversationHistory>,
}

impl GlpAssistant {
    pub fn new(gateway: Arc<dyn LlmGateway>, config: AssistantConfig) -> Self {
        let history = ConversationHistory::new(config.max_history_length);
        Self {
            gateway,
            config,
            history: Mutex::new(history),
        }
    }

    pub fn history(&self) -> Vec<Exchange> {
        self.lock_history().snapshot()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
        info!("conversation history cleared");
    }

    /// Messages for `query` against the current history. History itself is not modified.
    pub fn prompt_for(&self, query: &str) -> Vec<ChatMessage> {
        let history = self.lock_history().snapshot();
        assemble_messages(GLP1_SYSTEM_PROMPT, &history, query)
    }

    pub async fn answer(
        &self,
        query: &str,
        include_history: bool,
    ) -> Result<ChatResponse, ErrorResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(failure(query, &AssistantError::EmptyQuery));
        }

        let category = categorize_query(query);
        let request = LlmGatewayRequest::new(self.prompt_for(query));

        let outcome = match self.config.upstream_mode {
            UpstreamMode::Blocking => self
                .gateway
                .generate(request)
                .await
                .map(|response| {
                    debug!(
                        category = category.as_str(),
                        model = %response.model,
                        provider_request_id = response.provider_request_id.as_deref(),
                        prompt_tokens = response.usage.as_ref().map(|usage| usage.prompt_tokens),
                        completion_tokens =
                            response.usage.as_ref().map(|usage| usage.completion_tokens),
                        "assistant upstream replied"
                    );
                    SourcedAnswer::plain(&response.content)
                }),
            UpstreamMode::Streaming => match self.gateway.generate_stream(request).await {
                Ok(fragments) => collect_fragments(fragments)
                    .await
                    .map(|text| split_sources(&text)),
                Err(err) => Err(err),
            },
        };

        match outcome {
            Ok(answer) => Ok(self.record_success(query, category, answer, include_history)),
            Err(err) => {
                let err = AssistantError::from(err);
                warn!(category = category.as_str(), error = %err, "assistant query failed");
                Err(failure(query, &err))
            }
        }
    }

    /// Forwards fragments as they arrive, then ends with exactly one `Completed` or `Failed`.
    /// History is only written once the upstream stream completes; dropping the stream early
    /// aborts the upstream read and leaves history untouched.
    pub fn answer_stream(self: Arc<Self>, query: String, include_history: bool) -> ChatEventStream {
        Box::pin(stream! {
            let query = query.trim().to_string();
            if query.is_empty() {
                yield ChatStreamEvent::Failed(failure(&query, &AssistantError::EmptyQuery));
            } else {
                let category = categorize_query(&query);
                let request = LlmGatewayRequest::new(self.prompt_for(&query));

                match self.gateway.generate_stream(request).await {
                    Err(err) => {
                        let err = AssistantError::from(err);
                        warn!(category = category.as_str(), error = %err, "assistant stream rejected");
                        yield ChatStreamEvent::Failed(failure(&query, &err));
                    }
                    Ok(mut fragments) => {
                        let mut accumulated = String::new();
                        let mut stream_error = None;

                        while let Some(event) = fragments.next().await {
                            match event {
                                Ok(StreamEvent::Fragment(text)) => {
                                    accumulated.push_str(&text);
                                    yield ChatStreamEvent::Fragment(text);
                                }
                                Ok(StreamEvent::Done) => break,
                                Err(err) => {
                                    stream_error = Some(err);
                                    break;
                                }
                            }
                        }

                        match stream_error {
                            Some(err) => {
                                let err = AssistantError::from(err);
                                warn!(
                                    category = category.as_str(),
                                    discarded_chars = accumulated.chars().count(),
                                    error = %err,
                                    "assistant stream failed"
                                );
                                yield ChatStreamEvent::Failed(failure(&query, &err));
                            }
                            None => {
                                let answer = split_sources(&accumulated);
                                yield ChatStreamEvent::Completed(self.record_success(
                                    &query,
                                    category,
                                    answer,
                                    include_history,
                                ));
                            }
                        }
                    }
                }
            }
        })
    }

    fn record_success(
        &self,
        query: &str,
        category: QueryCategory,
        answer: SourcedAnswer,
        include_history: bool,
    ) -> ChatResponse {
        let timestamp = response_timestamp();
        let conversation_history = {
            let mut history = self.lock_history();
            history.push(Exchange {
                query: query.to_string(),
                response: answer.content.clone(),
                timestamp: timestamp.clone(),
            });
            include_history.then(|| history.snapshot())
        };

        info!(category = category.as_str(), "assistant query answered");
        reply::success_response(query, category, answer, timestamp, conversation_history)
    }

    fn lock_history(&self) -> MutexGuard<'_, ConversationHistory> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn failure(query: &str, err: &AssistantError) -> ErrorResponse {
    ErrorResponse::new(err.kind(), err.to_string()).with_query(query)
}
