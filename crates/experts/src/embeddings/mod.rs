//! Embedding providers and the gateway the rest of the crate embeds through.

pub mod provider;
pub mod providers;

pub use provider::{cosine_similarity, create_provider, EmbeddingProvider};

use hivemind_core::{AppError, AppResult};
use std::sync::Arc;

/// Single entry point for producing embeddings.
///
/// Rejects blank input and checks every returned vector against the
/// provider's declared dimensions, so stored vectors are always comparable.
#[derive(Debug, Clone)]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Validation(
                "Cannot embed empty text".to_string(),
            ));
        }

        let embedding = self.provider.embed(text).await?;
        let expected = self.provider.dimensions();
        if embedding.len() != expected {
            return Err(AppError::Llm(format!(
                "Embedding provider '{}' returned {} dimensions, expected {}",
                self.provider.provider_name(),
                embedding.len(),
                expected
            )));
        }

        tracing::debug!(
            provider = self.provider.provider_name(),
            model = self.provider.model_name(),
            text_len = text.len(),
            "Embedded text"
        );
        Ok(embedding)
    }

    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}
