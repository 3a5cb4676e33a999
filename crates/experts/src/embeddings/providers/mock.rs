//! Offline embedding provider built from word and character-trigram hashes.

use crate::embeddings::provider::EmbeddingProvider;
use hivemind_core::AppResult;
use std::collections::{HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "how", "what", "do", "does", "can", "should", "i",
];

/// Deterministic provider for tests and offline development.
///
/// Texts sharing words or word fragments land close together, which is
/// enough to exercise semantic matching and retrieval without a model.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_bytes(bytes: impl Iterator<Item = u8>, multiplier: u64) -> u64 {
        bytes.fold(0u64, |acc, b| acc.wrapping_mul(multiplier).wrapping_add(b as u64))
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let lower = text.to_lowercase();

        let mut frequencies: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1 && !stop_words.contains(w))
        {
            *frequencies.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &frequencies {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let idx = (Self::hash_bytes(trigram.bytes(), 37) as usize) % self.dimensions;
                embedding[idx] += (*freq as f32).sqrt();
            }

            let idx = (Self::hash_bytes(word.bytes(), 31) as usize) % self.dimensions;
            embedding[idx] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|v| *v /= norm);
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn test_unit_length_and_dimensions() {
        let provider = MockProvider::new(384);
        let embedding = provider.embed("machine learning pipelines").await.unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = MockProvider::new(128);
        let a = provider.embed("Data Science").await.unwrap();
        let b = provider.embed("data science").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_related_texts_are_closer() {
        let provider = MockProvider::new(384);
        let query = provider.embed("Machine Learning, Data Science").await.unwrap();
        let near = provider
            .embed("Machine Learning, Deep Learning")
            .await
            .unwrap();
        let far = provider.embed("Tax Law, Real Estate").await.unwrap();

        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_stop_words_only_gives_zero_vector() {
        let provider = MockProvider::new(16);
        let embedding = provider.embed("the and of").await.unwrap();
        assert!(embedding.iter().all(|v| *v == 0.0));
    }
}
