use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::image_prep::PreparedImage;

pub type ClassifierFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Classification, ClassifierError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    /// Probability of `label` on a 0–100 scale.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    #[error("image classifier request timed out")]
    Timeout,
    #[error("image classifier request failed: {0}")]
    ProviderFailure(String),
    #[error("image classifier returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

/// Zero-shot scorer over a caller-supplied label set.
pub trait ImageClassifier: Send + Sync {
    fn classify<'a>(
        &'a self,
        image: &'a PreparedImage,
        labels: &'a [&'static str],
    ) -> ClassifierFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct ZeroShotConfig {
    pub endpoint_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

/// Hugging Face inference endpoint for a CLIP-style zero-shot image classification model.
#[derive(Clone)]
pub struct HuggingFaceZeroShotClassifier {
    client: reqwest::Client,
    config: ZeroShotConfig,
}

impl HuggingFaceZeroShotClassifier {
    pub fn new(config: ZeroShotConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ClassifierError::ProviderFailure(err.to_string()))?;

        Ok(Self { client, config })
    }
}

impl ImageClassifier for HuggingFaceZeroShotClassifier {
    fn classify<'a>(
        &'a self,
        image: &'a PreparedImage,
        labels: &'a [&'static str],
    ) -> ClassifierFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.config.endpoint_url)
                .bearer_auth(&self.config.api_key)
                .json(&json!({
                    "inputs": image.to_base64(),
                    "parameters": { "candidate_labels": labels },
                }))
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        ClassifierError::Timeout
                    } else {
                        ClassifierError::ProviderFailure("request_unavailable".to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ClassifierError::ProviderFailure(format!(
                    "status={}",
                    status.as_u16()
                )));
            }

            let scores = response.json::<Vec<LabelScore>>().await.map_err(|err| {
                if err.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::InvalidProviderPayload("scores_parse_failed".to_string())
                }
            })?;

            select_best_label(&scores, labels).ok_or_else(|| {
                ClassifierError::InvalidProviderPayload("no_candidate_label_scored".to_string())
            })
        })
    }
}

/// Arg-max over scores for the candidate labels; scores for unknown labels are ignored.
pub fn select_best_label(scores: &[LabelScore], labels: &[&str]) -> Option<Classification> {
    scores
        .iter()
        .filter(|score| score.score.is_finite())
        .filter(|score| labels.iter().any(|label| label.eq_ignore_ascii_case(&score.label)))
        .max_by(|left, right| left.score.total_cmp(&right.score))
        .map(|best| Classification {
            label: labels
                .iter()
                .find(|label| label.eq_ignore_ascii_case(&best.label))
                .map(|label| (*label).to_string())
                .unwrap_or_else(|| best.label.clone()),
            confidence: (best.score * 100.0).clamp(0.0, 100.0),
        })
}
