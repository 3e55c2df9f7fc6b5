//! Generative fallback for queries the knowledge base cannot answer.
//!
//! The assistant persona goes out as the system prompt. The user prompt is a
//! handlebars template with two inputs: `query` and `context` (a list of
//! passages, possibly empty). A custom template can be supplied through
//! `llm.prompt_template`.

use handlebars::Handlebars;
use mitra_core::{AppError, AppResult, Settings};
use mitra_llm::{LlmClient, LlmRequest};
use serde::Serialize;
use std::sync::Arc;

const TEMPLATE_NAME: &str = "fallback";

const SYSTEM_PROMPT: &str = "You are an expert Aadhaar customer service assistant. \
Your role is to provide accurate and helpful information about Aadhaar services, processes, and requirements.";

const DEFAULT_TEMPLATE: &str = r#"{{#if context}}These passages from the Aadhaar knowledge base may be related to the question. They did not answer it with confidence, so use them only where they actually help:
{{#each context}}
[{{@index}}] {{this}}
{{/each}}

{{/if}}Question: {{query}}

Answer:"#;

/// Produces an answer when confidence arbitration rejects retrieval.
#[async_trait::async_trait]
pub trait FallbackGenerator: Send + Sync {
    /// Generate an answer for `query`, optionally grounded on `context`.
    ///
    /// Fails with `Generation` on upstream failure or empty output. Not
    /// retried.
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String>;
}

#[derive(Serialize)]
struct PromptData<'a> {
    query: &'a str,
    context: &'a [String],
}

/// Fallback backed by an [`LlmClient`].
pub struct LlmFallback {
    client: Arc<dyn LlmClient>,
    model: String,
    templates: Handlebars<'static>,
}

impl LlmFallback {
    /// Build a fallback around `client`, using `template` or the built-in
    /// prompt.
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        template: Option<&str>,
    ) -> AppResult<Self> {
        let mut templates = Handlebars::new();
        templates.register_escape_fn(handlebars::no_escape);
        templates
            .register_template_string(TEMPLATE_NAME, template.unwrap_or(DEFAULT_TEMPLATE))
            .map_err(|e| {
                AppError::InvalidConfiguration(format!("Invalid fallback prompt template: {}", e))
            })?;

        Ok(Self {
            client,
            model: model.into(),
            templates,
        })
    }

    /// Build the configured provider client and prompt.
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let api_key = settings.resolve_api_key();
        let client = mitra_llm::create_client(
            &settings.llm.provider,
            settings.llm.endpoint.as_deref(),
            api_key.as_deref(),
        )?;

        Self::new(
            client,
            settings.llm.model_name.clone(),
            settings.llm.prompt_template.as_deref(),
        )
    }

    pub fn render_prompt(&self, query: &str, context: &[String]) -> AppResult<String> {
        self.templates
            .render(TEMPLATE_NAME, &PromptData { query, context })
            .map_err(|e| AppError::Generation(format!("Failed to render fallback prompt: {}", e)))
    }
}

#[async_trait::async_trait]
impl FallbackGenerator for LlmFallback {
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        temperature: f32,
        max_tokens: u32,
    ) -> AppResult<String> {
        let prompt = self.render_prompt(query, context)?;

        tracing::debug!(
            "Generating fallback answer with {} (model: {}, context passages: {})",
            self.client.provider_name(),
            self.model,
            context.len()
        );

        let request = LlmRequest::new(prompt, self.model.clone())
            .with_system(SYSTEM_PROMPT)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);

        let response = self.client.complete(&request).await.map_err(|e| match e {
            AppError::Generation(_) => e,
            other => AppError::Generation(format!("LLM request failed: {}", other)),
        })?;

        let answer = response.content.trim();
        if answer.is_empty() {
            return Err(AppError::Generation(
                "Language model returned an empty answer".to_string(),
            ));
        }

        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::ScriptedLlm;

    #[test]
    fn test_default_prompt_includes_context() {
        let fallback = LlmFallback::new(Arc::new(ScriptedLlm::new("unused")), "llama3.2", None).unwrap();
        let prompt = fallback
            .render_prompt(
                "Can I use Aadhaar abroad?",
                &["Aadhaar is for residents of India.".to_string()],
            )
            .unwrap();

        assert!(prompt.contains("Question: Can I use Aadhaar abroad?"));
        assert!(prompt.contains("[0] Aadhaar is for residents of India."));
    }

    #[test]
    fn test_default_prompt_without_context() {
        let fallback = LlmFallback::new(Arc::new(ScriptedLlm::new("unused")), "llama3.2", None).unwrap();
        let prompt = fallback.render_prompt("What is a VID?", &[]).unwrap();

        assert!(!prompt.contains("passages"));
        assert!(prompt.starts_with("Question: What is a VID?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_is_not_html_escaped() {
        let fallback = LlmFallback::new(Arc::new(ScriptedLlm::new("unused")), "llama3.2", None).unwrap();
        let prompt = fallback.render_prompt("PAN & Aadhaar <link>?", &[]).unwrap();
        assert!(prompt.contains("PAN & Aadhaar <link>?"));
    }

    #[test]
    fn test_invalid_custom_template_rejected() {
        let result = LlmFallback::new(
            Arc::new(ScriptedLlm::new("unused")),
            "llama3.2",
            Some("{{#each context}}unterminated"),
        );
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_generate_passes_parameters() {
        let llm = Arc::new(ScriptedLlm::new("  You can book an appointment online.  "));
        let fallback = LlmFallback::new(llm.clone(), "llama3.2", Some("Q: {{query}}")).unwrap();

        let answer = fallback
            .generate("How to book?", &[], 0.3, 128)
            .await
            .unwrap();
        assert_eq!(answer, "You can book an appointment online.");

        let request = llm.last_request().unwrap();
        assert_eq!(request.prompt, "Q: How to book?");
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.system.as_deref(), Some(SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_persona_is_system_prompt_not_user_prompt() {
        let llm = Arc::new(ScriptedLlm::new("Yes."));
        let fallback = LlmFallback::new(llm.clone(), "llama3.2", None).unwrap();
        fallback.generate("Is enrolment free?", &[], 0.7, 64).await.unwrap();

        let request = llm.last_request().unwrap();
        assert!(request.system.unwrap().contains("Aadhaar customer service"));
        assert!(!request.prompt.contains("customer service"));
    }

    #[tokio::test]
    async fn test_empty_output_is_generation_error() {
        let fallback = LlmFallback::new(Arc::new(ScriptedLlm::new("   ")), "llama3.2", None).unwrap();
        let result = fallback.generate("anything", &[], 0.7, 64).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_generation_error() {
        let fallback = LlmFallback::new(Arc::new(ScriptedLlm::failing()), "llama3.2", None).unwrap();
        let result = fallback.generate("anything", &[], 0.7, 64).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }
}
