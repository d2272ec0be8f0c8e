//! Model configuration and the static platform/model/ceiling table.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Generation platforms the service can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "local")]
    Local,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Local => "local",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "OpenAI" => Some(Self::OpenAi),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Known models per platform with their max_tokens ceilings.
const MODEL_TABLE: &[(&str, &[(&str, u32)])] = &[
    (
        "OpenAI",
        &[
            ("gpt-4o", 16_384),
            ("gpt-4o-mini", 16_384),
            ("gpt-4-1106-preview", 4_096),
        ],
    ),
    ("local", &[("qwen2-7b", 32_768), ("qwen2-1.5b", 32_768)]),
];

fn ceiling(platform: &str, model: &str) -> Option<u32> {
    MODEL_TABLE
        .iter()
        .find(|(p, _)| *p == platform)?
        .1
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, c)| *c)
}

/// `chat_model` as it arrives on the wire. Platform stays a plain string
/// here so an unknown one surfaces as a proper 400, not a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatModelRequest {
    pub platform: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatModelRequest {
    /// Validate against the static table: platform known, model known under
    /// the platform, temperature in [0, 1], max_tokens in [256, ceiling].
    pub fn validate(&self) -> Result<ChatModelConfig, ValidationError> {
        let Some(platform) = Platform::from_name(&self.platform) else {
            return Err(ValidationError::UnsupportedPlatform(self.platform.clone()));
        };
        let Some(ceiling) = ceiling(&self.platform, &self.model_name) else {
            return Err(ValidationError::UnsupportedModel {
                platform: self.platform.clone(),
                model: self.model_name.clone(),
            });
        };
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ValidationError::TemperatureOutOfRange);
        }
        if !(256..=ceiling).contains(&self.max_tokens) {
            return Err(ValidationError::MaxTokensOutOfRange { ceiling });
        }
        Ok(ChatModelConfig {
            platform,
            model_name: self.model_name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

/// Validated per-request model configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ChatModelConfig {
    pub platform: Platform,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}
