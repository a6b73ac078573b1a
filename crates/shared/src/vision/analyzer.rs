use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::llm::prompts::{FOOD_ANALYSIS_SYSTEM_PROMPT, classifier_hint};
use crate::llm::{ChatMessage, ContentPart, ImageUrl, LlmGateway, LlmGatewayError, LlmGatewayRequest};
use crate::models::ErrorKind;

use super::FOOD_HEALTH_LABELS;
use super::classifier::{ClassifierError, ImageClassifier};
use super::image_prep::{ImagePrepError, PreparedImage, prepare_image};
use super::report::{FoodReport, parse_food_report};

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    InvalidImage(#[from] ImagePrepError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Upstream(#[from] LlmGatewayError),
    #[error("image worker failed: {0}")]
    Worker(String),
}

impl AnalyzerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidImage(_) | Self::Worker(_) => ErrorKind::Processing,
            Self::Classifier(ClassifierError::Timeout) => ErrorKind::Timeout,
            Self::Upstream(err) if err.is_timeout() => ErrorKind::Timeout,
            Self::Classifier(_) | Self::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

pub struct FoodAnalyzer {
    vision: Arc<dyn LlmGateway>,
    classifier: Option<Arc<dyn ImageClassifier>>,
    max_image_dimension: u32,
}

impl FoodAnalyzer {
    pub fn new(
        vision: Arc<dyn LlmGateway>,
        classifier: Option<Arc<dyn ImageClassifier>>,
        max_image_dimension: u32,
    ) -> Self {
        Self {
            vision,
            classifier,
            max_image_dimension,
        }
    }

    /// resize → optional zero-shot classification → vision model → fixed-format parse.
    pub async fn analyze(&self, image_bytes: Vec<u8>) -> Result<FoodReport, AnalyzerError> {
        let max_dimension = self.max_image_dimension;
        let prepared = tokio::task::spawn_blocking(move || prepare_image(&image_bytes, max_dimension))
            .await
            .map_err(|err| AnalyzerError::Worker(err.to_string()))??;
        debug!(
            width = prepared.width,
            height = prepared.height,
            jpeg_bytes = prepared.jpeg_bytes.len(),
            "image prepared for analysis"
        );

        let seed = match &self.classifier {
            Some(classifier) => {
                let classification = classifier.classify(&prepared, &FOOD_HEALTH_LABELS).await?;
                debug!(
                    label = %classification.label,
                    confidence = classification.confidence,
                    "zero-shot classification complete"
                );
                FoodReport {
                    category: classification.label,
                    confidence: classification.confidence,
                    analysis: String::new(),
                }
            }
            None => FoodReport::default(),
        };

        let response = self.vision.generate(food_analysis_request(&prepared, &seed)).await?;
        let report = parse_food_report(&response.content, seed);
        info!(
            category = %report.category,
            confidence = report.confidence,
            model = %response.model,
            provider_request_id = response.provider_request_id.as_deref(),
            total_tokens = response.usage.as_ref().map(|usage| usage.total_tokens),
            "food image analysed"
        );
        Ok(report)
    }
}

fn food_analysis_request(image: &PreparedImage, seed: &FoodReport) -> LlmGatewayRequest {
    let mut parts = Vec::with_capacity(2);
    if !seed.category.is_empty() {
        parts.push(ContentPart::Text {
            text: classifier_hint(&seed.category, seed.confidence),
        });
    }
    parts.push(ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: image.data_url(),
        },
    });

    LlmGatewayRequest::new(vec![
        ChatMessage::system(FOOD_ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user_parts(parts),
    ])
}
