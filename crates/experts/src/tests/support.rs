//! Shared fixtures for scenario tests.

use crate::embeddings::EmbeddingProvider;
use crate::prompts::PromptSet;
use crate::service::{CreatedRequest, ExpertService, NewExpertRequest};
use crate::store::Store;
use crate::types::{ExpertProfile, ExpertRequest};
use chrono::Utc;
use hivemind_core::config::ExpertsConfig;
use hivemind_core::{AppError, AppResult};
use hivemind_llm::{ModelBinding, ModelRegistry, ScriptedClient};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Unit vector whose cosine similarity to `QUERY` is `similarity`.
pub fn at_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt()]
}

pub const QUERY: [f32; 2] = [1.0, 0.0];

/// Embedder with a fixed vector per text. Unknown texts fail.
#[derive(Debug, Default)]
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.vectors
                    .get(text)
                    .cloned()
                    .ok_or_else(|| AppError::Llm(format!("no vector for '{}'", text)))
            })
            .collect()
    }
}

/// Embedder that always fails.
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Llm("embedding service unavailable".to_string()))
    }
}

pub fn config() -> ExpertsConfig {
    let mut config = ExpertsConfig::default();
    config.quality.min_question_chars = 20;
    config
}

/// A service over an in-memory store with every model role scripted.
pub struct Harness {
    pub service: ExpertService,
    pub llm: Arc<ScriptedClient>,
    pub asker: ExpertProfile,
}

impl Harness {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: ExpertsConfig) -> Self {
        let llm = Arc::new(ScriptedClient::new());
        let models = ModelRegistry::new(ModelBinding::new(llm.clone(), "scripted"));
        let service = ExpertService::new(
            Arc::new(Store::open_in_memory().unwrap()),
            embedder,
            &models,
            PromptSet::builtin().unwrap(),
            &config,
        );

        let asker = ExpertProfile {
            id: "asker".to_string(),
            email: "asker@example.com".to_string(),
            expertise: None,
            expertise_tags: vec![],
            tags_embedding: None,
            credits: 0,
            xp: 0,
            created_at: Utc::now(),
        };
        service.store().insert_expert(&asker).unwrap();

        Self {
            service,
            llm,
            asker,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        self.service.store()
    }

    /// Insert an expert with an exact tag embedding.
    pub fn add_expert(&self, name: &str, tags: &[&str], embedding: Option<Vec<f32>>) -> ExpertProfile {
        let expert = ExpertProfile {
            id: name.to_string(),
            email: format!("{}@example.com", name),
            expertise: None,
            expertise_tags: tags.iter().map(|t| t.to_string()).collect(),
            tags_embedding: embedding,
            credits: 0,
            xp: 0,
            created_at: Utc::now(),
        };
        self.store().insert_expert(&expert).unwrap();
        expert
    }

    /// Create a titled request with explicit tags, so no model is called.
    pub async fn ask(&self, question: &str, tags: &[&str]) -> CreatedRequest {
        self.service
            .create_expert_request(NewExpertRequest {
                user_id: self.asker.id.clone(),
                chat_id: None,
                question: question.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                title: Some("Test request".to_string()),
            })
            .await
            .unwrap()
    }

    pub fn request(&self, request_id: &str) -> ExpertRequest {
        self.service.get_request(request_id).unwrap()
    }
}
