//! Provider-neutral completion types and the `LlmClient` capability.

use mitra_core::AppResult;
use serde::{Deserialize, Serialize};

/// A single prompt-in, text-out completion.
///
/// Sampling fields left as `None` fall back to the provider's own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// 0.0 - 2.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(self, system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..self
        }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }

    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,

    /// Model name as reported by the provider
    pub model: String,

    pub usage: LlmUsage,
}

/// Token accounting, when the provider reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A generative model endpoint.
///
/// Upstream failures (transport, rate limiting, malformed bodies) surface as
/// `AppError::Generation`. Implementations do not retry.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_sampling_options() {
        let request = LlmRequest::new("What is Aadhaar?", "llama3.2")
            .with_system("Answer briefly")
            .with_temperature(0.7)
            .with_max_tokens(256);

        assert_eq!(request.prompt, "What is Aadhaar?");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.system.as_deref(), Some("Answer briefly"));
    }

    #[test]
    fn test_unset_options_are_not_serialized() {
        let json = serde_json::to_value(LlmRequest::new("hi", "llama3.2")).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(LlmUsage::new(12, 30).total_tokens, 42);
        assert_eq!(LlmUsage::new(u32::MAX, 1).total_tokens, u32::MAX);
    }
}
