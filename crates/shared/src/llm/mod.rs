pub mod chat_completions;
pub mod gateway;
pub mod prompts;
pub mod stream;

pub use chat_completions::{
    ChatCompletionsBuildError, ChatCompletionsConfig, ChatCompletionsGateway,
};
pub use gateway::{
    ChatMessage, ChatRole, ContentPart, ImageUrl, LlmFragmentStream, LlmGateway, LlmGatewayError,
    LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse, LlmStreamFuture, LlmTokenUsage,
    MessageContent, StreamEvent,
};
pub use stream::{SseLine, SseLineBuffer, collect_fragments, decode_sse_line};
