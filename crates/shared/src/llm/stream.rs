use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;

use super::gateway::{LlmFragmentStream, LlmGatewayError, StreamEvent};

const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Reassembles newline-terminated SSE lines from arbitrarily split network chunks.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_at) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw = self.pending.drain(..=newline_at).collect::<Vec<_>>();
            let without_newline = raw.strip_suffix(b"\n").unwrap_or(&raw);
            lines.push(decode_line(without_newline));
        }
        lines
    }

    /// Returns the unterminated tail, if any, once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\r')
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Blank lines, comments, non-data fields and chunks without choices.
    Ignored,
    Delta {
        content: Option<String>,
        finished: bool,
    },
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

pub fn decode_sse_line(line: &str) -> Result<SseLine, LlmGatewayError> {
    let Some(data) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return Ok(SseLine::Ignored);
    };

    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Ignored);
    }
    if data == SSE_DONE_SENTINEL {
        return Ok(SseLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|_| {
        LlmGatewayError::InvalidProviderPayload("malformed_stream_chunk".to_string())
    })?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseLine::Ignored);
    };

    Ok(SseLine::Delta {
        content: choice
            .delta
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty()),
        finished: choice.finish_reason.is_some(),
    })
}

pub(crate) fn fragment_stream(response: reqwest::Response) -> LlmFragmentStream {
    Box::pin(stream! {
        let mut lines = SseLineBuffer::default();
        let mut body = std::pin::pin!(response.bytes_stream());
        let mut finished = false;

        'body: while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(map_transport_error(&err));
                    finished = true;
                    break 'body;
                }
            };

            for line in lines.push(&chunk) {
                match decode_sse_line(&line) {
                    Ok(SseLine::Ignored) => {}
                    Ok(SseLine::Delta { content, finished: terminal }) => {
                        if let Some(content) = content {
                            yield Ok(StreamEvent::Fragment(content));
                        }
                        if terminal {
                            yield Ok(StreamEvent::Done);
                            finished = true;
                            break 'body;
                        }
                    }
                    Ok(SseLine::Done) => {
                        yield Ok(StreamEvent::Done);
                        finished = true;
                        break 'body;
                    }
                    Err(err) => {
                        yield Err(err);
                        finished = true;
                        break 'body;
                    }
                }
            }
        }

        if !finished {
            let tail = lines.finish().map(|line| decode_sse_line(&line));
            match tail {
                Some(Err(err)) => {
                    yield Err(err);
                }
                Some(Ok(SseLine::Delta { content: Some(content), .. })) => {
                    yield Ok(StreamEvent::Fragment(content));
                    yield Ok(StreamEvent::Done);
                }
                _ => {
                    yield Ok(StreamEvent::Done);
                }
            }
        }
    })
}

/// Drains a fragment stream into one string. Content accumulated before an error is discarded.
pub async fn collect_fragments(mut fragments: LlmFragmentStream) -> Result<String, LlmGatewayError> {
    let mut accumulated = String::new();
    while let Some(event) = fragments.next().await {
        match event? {
            StreamEvent::Fragment(text) => accumulated.push_str(&text),
            StreamEvent::Done => break,
        }
    }
    Ok(accumulated)
}

pub(crate) fn map_transport_error(err: &reqwest::Error) -> LlmGatewayError {
    if err.is_timeout() {
        LlmGatewayError::Timeout
    } else {
        LlmGatewayError::ProviderFailure("request_unavailable".to_string())
    }
}
