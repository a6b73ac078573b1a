use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::llm::prompts::{MEDICAL_PROFILE_SYSTEM_PROMPT, PERSONAL_PROFILE_SYSTEM_PROMPT};
use crate::llm::{ChatMessage, LlmGateway, LlmGatewayRequest};
use crate::models::{MedicalProfile, PersonalProfile};

const PROFILE_MAX_TOKENS: u32 = 300;

/// Pulls structured onboarding fields out of free text. Nothing is retained between calls;
/// any upstream or parse failure yields an empty profile.
pub struct ProfileExtractor {
    gateway: Arc<dyn LlmGateway>,
}

impl ProfileExtractor {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    pub async fn extract_personal(&self, input: &str) -> PersonalProfile {
        let Some(fields) = self.extract_fields(PERSONAL_PROFILE_SYSTEM_PROMPT, input).await else {
            return PersonalProfile::default();
        };

        PersonalProfile {
            name: field_text(&fields, "name"),
            age: field_text(&fields, "age"),
            location: field_text(&fields, "location"),
        }
    }

    pub async fn extract_medical(&self, input: &str) -> MedicalProfile {
        let Some(fields) = self.extract_fields(MEDICAL_PROFILE_SYSTEM_PROMPT, input).await else {
            return MedicalProfile::default();
        };

        MedicalProfile {
            diagnosis: field_text(&fields, "diagnosis"),
            concern: field_text(&fields, "concern"),
            target: field_text(&fields, "target"),
        }
    }

    async fn extract_fields(&self, system_prompt: &str, input: &str) -> Option<Map<String, Value>> {
        let request = LlmGatewayRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(input.trim()),
        ])
        .with_temperature(0.0)
        .with_max_tokens(PROFILE_MAX_TOKENS)
        .expect_json();

        let response = match self.gateway.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "profile extraction request failed");
                return None;
            }
        };

        match parse_json_object(&response.content) {
            Some(fields) => Some(fields),
            None => {
                warn!("profile extraction returned a non-object payload");
                None
            }
        }
    }
}

/// Accepts a bare JSON object or one wrapped in a markdown code fence.
fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|body| body.strip_suffix("```"))
        .unwrap_or(trimmed);

    match serde_json::from_str::<Value>(unfenced.trim()).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn field_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match fields.get(key)? {
        Value::String(value) => value.trim().to_string(),
        Value::Number(value) => value.to_string(),
        _ => return None,
    };

    (!text.is_empty()).then_some(text)
}
