use crate::models::{ChatResponse, MEDICAL_DISCLAIMER, ResponseStatus};

use super::categorizer::QueryCategory;
use super::history::Exchange;

const SOURCES_MARKER: &str = "\nSources:";
pub const NO_SOURCES_PROVIDED: &str = "No sources provided";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedAnswer {
    pub content: String,
    pub sources: Option<String>,
}

impl SourcedAnswer {
    pub fn plain(content: &str) -> Self {
        Self {
            content: content.trim().to_string(),
            sources: None,
        }
    }
}

/// Splits streamed output on the first `"\nSources:"` line into body and source list.
pub fn split_sources(text: &str) -> SourcedAnswer {
    match text.split_once(SOURCES_MARKER) {
        Some((content, sources)) => SourcedAnswer {
            content: content.trim().to_string(),
            sources: Some(sources.trim().to_string()),
        },
        None => SourcedAnswer {
            content: text.trim().to_string(),
            sources: Some(NO_SOURCES_PROVIDED.to_string()),
        },
    }
}

pub(super) fn success_response(
    query: &str,
    category: QueryCategory,
    answer: SourcedAnswer,
    timestamp: String,
    conversation_history: Option<Vec<Exchange>>,
) -> ChatResponse {
    ChatResponse {
        status: ResponseStatus::Success,
        query: query.to_string(),
        query_category: category,
        response: answer.content,
        sources: answer.sources,
        disclaimer: MEDICAL_DISCLAIMER.to_string(),
        timestamp,
        conversation_history,
    }
}
