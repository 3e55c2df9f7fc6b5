//! Embedding provider trait and factory.

use mitra_core::config::EmbeddingSettings;
use mitra_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
///
/// The same provider must be used for ingestion and for queries; vectors
/// from different models are not comparable.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "hashing", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from settings.
pub fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "hashing" => Ok(Arc::new(super::providers::HashingProvider::new(
            settings.dimensions,
        ))),

        "ollama" => {
            let provider = match settings.endpoint.as_deref() {
                Some(url) => super::providers::OllamaProvider::with_base_url(
                    url,
                    &settings.model,
                    settings.dimensions,
                ),
                None => super::providers::OllamaProvider::new(&settings.model, settings.dimensions),
            };
            Ok(Arc::new(provider))
        }

        other => Err(AppError::InvalidConfiguration(format!(
            "Unknown embedding provider: '{}'. Supported providers: hashing, ollama",
            other
        ))),
    }
}
