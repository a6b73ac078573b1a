#![allow(dead_code)]

pub mod api_app;

use std::io::Cursor;
use std::sync::Mutex;

use futures::stream;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use shared::llm::{
    ChatMessage, LlmFragmentStream, LlmGateway, LlmGatewayError, LlmGatewayFuture,
    LlmGatewayRequest, LlmGatewayResponse, LlmStreamFuture, StreamEvent,
};
use shared::vision::{
    Classification, ClassifierError, ClassifierFuture, ImageClassifier, PreparedImage,
};

/// Answers every call with the same text; streaming splits it at spaces.
pub struct CannedGateway {
    reply: Result<String, LlmGatewayError>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedGateway {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: LlmGatewayError) -> Self {
        Self {
            reply: Err(err),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn record(&self, request: LlmGatewayRequest) {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.messages);
    }
}

impl LlmGateway for CannedGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            self.record(request);
            self.reply.clone().map(|content| LlmGatewayResponse {
                model: "canned".to_string(),
                provider_request_id: Some("req-canned".to_string()),
                content,
                usage: None,
            })
        })
    }

    fn generate_stream<'a>(&'a self, request: LlmGatewayRequest) -> LlmStreamFuture<'a> {
        Box::pin(async move {
            self.record(request);
            let text = self.reply.clone()?;
            let mut events = text
                .split_inclusive(' ')
                .map(|piece| Ok(StreamEvent::Fragment(piece.to_string())))
                .collect::<Vec<_>>();
            events.push(Ok(StreamEvent::Done));
            let fragments: LlmFragmentStream = Box::pin(stream::iter(events));
            Ok(fragments)
        })
    }
}

pub struct FixedClassifier {
    pub label: &'static str,
    pub confidence: f32,
}

impl ImageClassifier for FixedClassifier {
    fn classify<'a>(
        &'a self,
        _image: &'a PreparedImage,
        labels: &'a [&'static str],
    ) -> ClassifierFuture<'a> {
        Box::pin(async move {
            if !labels.contains(&self.label) {
                return Err(ClassifierError::InvalidProviderPayload(
                    "label_not_offered".to_string(),
                ));
            }
            Ok(Classification {
                label: self.label.to_string(),
                confidence: self.confidence,
            })
        })
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let buffer = ImageBuffer::from_pixel(width, height, Rgb([200_u8, 120, 40]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encode should succeed");
    bytes
}
