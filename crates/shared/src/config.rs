use thiserror::Error;
use url::Url;

use crate::assistant::{AssistantConfig, DEFAULT_MAX_HISTORY_LENGTH, UpstreamMode};
use crate::config_env::{
    optional_trimmed_env, parse_f32_env, parse_http_url_env, parse_list_env, parse_u32_env,
    parse_u64_env, parse_usize_env, require_env,
};
use crate::llm::ChatCompletionsConfig;
use crate::vision::{DEFAULT_MAX_IMAGE_DIMENSION, ZeroShotConfig};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 250;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MIN_IMAGE_DIMENSION: u32 = 16;

const DEFAULT_PPLX_CHAT_COMPLETIONS_URL: &str = "https://api.perplexity.ai/chat/completions";
const DEFAULT_PPLX_MODEL: &str = "llama-3.1-sonar-large-128k-online";
const DEFAULT_PPLX_TEMPERATURE: f32 = 0.1;
const DEFAULT_PPLX_MAX_TOKENS: u32 = 1500;

const DEFAULT_OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_VISION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_MAX_TOKENS: u32 = 1000;

const DEFAULT_HF_ZERO_SHOT_URL: &str =
    "https://api-inference.huggingface.co/models/openai/clip-vit-base-patch32";

const DEFAULT_CORS_ALLOWED_ORIGINS: &[&str] =
    &["http://localhost:3000", "https://glp-1-lovat.vercel.app"];

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub perplexity: ChatCompletionsConfig,
    pub openai: ChatCompletionsConfig,
    pub zero_shot: Option<ZeroShotConfig>,
    pub assistant: AssistantConfig,
    pub max_image_dimension: u32,
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid number in env var {0}")]
    ParseFloat(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Loads `.env` from the working directory when present. A missing file is not an error.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::InvalidConfiguration(format!(
            "failed to load .env file: {err}"
        ))),
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let perplexity = ChatCompletionsConfig {
            chat_completions_url: parse_http_url_env(
                "PPLX_CHAT_COMPLETIONS_URL",
                DEFAULT_PPLX_CHAT_COMPLETIONS_URL,
            )?,
            api_key: require_env("PPLX_API_KEY")?,
            model: optional_trimmed_env("PPLX_MODEL")
                .unwrap_or_else(|| DEFAULT_PPLX_MODEL.to_string()),
            temperature: Some(parse_temperature_env(
                "PPLX_TEMPERATURE",
                DEFAULT_PPLX_TEMPERATURE,
            )?),
            max_tokens: Some(parse_u32_env("PPLX_MAX_TOKENS", DEFAULT_PPLX_MAX_TOKENS)?),
            timeout_ms: parse_u64_env("PPLX_TIMEOUT_MS", DEFAULT_UPSTREAM_TIMEOUT_MS)?,
            max_retries: parse_u32_env("PPLX_MAX_RETRIES", 0)?,
            retry_base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
        };

        let openai = ChatCompletionsConfig {
            chat_completions_url: parse_http_url_env(
                "OPENAI_CHAT_COMPLETIONS_URL",
                DEFAULT_OPENAI_CHAT_COMPLETIONS_URL,
            )?,
            api_key: require_env("OPENAI_API_KEY")?,
            model: optional_trimmed_env("OPENAI_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_VISION_MODEL.to_string()),
            temperature: None,
            max_tokens: Some(parse_u32_env("OPENAI_MAX_TOKENS", DEFAULT_OPENAI_MAX_TOKENS)?),
            timeout_ms: parse_u64_env("OPENAI_TIMEOUT_MS", DEFAULT_UPSTREAM_TIMEOUT_MS)?,
            max_retries: parse_u32_env("OPENAI_MAX_RETRIES", 0)?,
            retry_base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
        };

        let zero_shot = match optional_trimmed_env("HF_API_KEY") {
            Some(api_key) => Some(ZeroShotConfig {
                endpoint_url: parse_http_url_env("HF_ZERO_SHOT_URL", DEFAULT_HF_ZERO_SHOT_URL)?,
                api_key,
                timeout_ms: parse_u64_env("HF_TIMEOUT_MS", DEFAULT_UPSTREAM_TIMEOUT_MS)?,
            }),
            None => None,
        };

        let max_history_length =
            parse_usize_env("ASSISTANT_MAX_HISTORY", DEFAULT_MAX_HISTORY_LENGTH)?;
        if max_history_length == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "ASSISTANT_MAX_HISTORY must be at least 1".to_string(),
            ));
        }

        let upstream_mode = match optional_trimmed_env("ASSISTANT_UPSTREAM_MODE") {
            Some(raw) => raw.parse::<UpstreamMode>().map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "ASSISTANT_UPSTREAM_MODE must be 'blocking' or 'streaming', got '{raw}'"
                ))
            })?,
            None => UpstreamMode::Blocking,
        };

        let max_image_dimension =
            parse_u32_env("VISION_MAX_IMAGE_DIMENSION", DEFAULT_MAX_IMAGE_DIMENSION)?;
        if max_image_dimension < MIN_IMAGE_DIMENSION {
            return Err(ConfigError::InvalidConfiguration(format!(
                "VISION_MAX_IMAGE_DIMENSION must be at least {MIN_IMAGE_DIMENSION}"
            )));
        }

        let cors_allowed_origins =
            parse_list_env("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGINS);
        for origin in &cors_allowed_origins {
            validate_origin(origin)?;
        }

        Ok(Self {
            bind_addr: optional_trimmed_env("API_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            perplexity,
            openai,
            zero_shot,
            assistant: AssistantConfig {
                max_history_length,
                upstream_mode,
            },
            max_image_dimension,
            cors_allowed_origins,
            max_upload_bytes: parse_usize_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }
}

fn parse_temperature_env(key: &str, default: f32) -> Result<f32, ConfigError> {
    let value = parse_f32_env(key, default)?;
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{key} must be between 0 and 2"
        )));
    }
    Ok(value)
}

fn validate_origin(origin: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(origin).map_err(|_| {
        ConfigError::InvalidConfiguration(format!(
            "CORS_ALLOWED_ORIGINS contains invalid origin '{origin}'"
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.path() != "/" {
        return Err(ConfigError::InvalidConfiguration(format!(
            "CORS_ALLOWED_ORIGINS entry '{origin}' must be a bare http(s) origin"
        )));
    }
    Ok(())
}
