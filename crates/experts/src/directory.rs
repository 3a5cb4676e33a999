//! Expert profiles and their tag embeddings.

use crate::embeddings::EmbeddingGateway;
use crate::store::Store;
use crate::tags::{extract_expertise_tags, normalize_tags, tag_text};
use crate::types::ExpertProfile;
use chrono::Utc;
use hivemind_core::{AppError, AppResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ExpertDirectory {
    store: Arc<Store>,
    embeddings: EmbeddingGateway,
}

impl ExpertDirectory {
    pub fn new(store: Arc<Store>, embeddings: EmbeddingGateway) -> Self {
        Self { store, embeddings }
    }

    /// Register a new expert.
    ///
    /// With no explicit tags, tags are extracted from `expertise`. The tag
    /// embedding is computed when possible; a provider failure leaves the
    /// profile without one.
    pub async fn register(
        &self,
        email: &str,
        expertise: Option<&str>,
        tags: &[String],
    ) -> AppResult<ExpertProfile> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation(format!("Invalid email: '{}'", email)));
        }
        if self.store.get_expert_by_email(email)?.is_some() {
            return Err(AppError::Validation(format!(
                "An expert with email {} already exists",
                email
            )));
        }

        let expertise = expertise.map(str::trim).filter(|e| !e.is_empty());
        let tags = resolve_tags(expertise, tags);

        let mut expert = ExpertProfile {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            expertise: expertise.map(str::to_string),
            tags_embedding: None,
            expertise_tags: tags,
            credits: 0,
            xp: 0,
            created_at: Utc::now(),
        };
        expert.tags_embedding = self.try_embed_tags(&expert).await;

        self.store.insert_expert(&expert)?;
        tracing::info!(
            expert_id = %expert.id,
            tags = expert.expertise_tags.len(),
            embedded = expert.tags_embedding.is_some(),
            "Registered expert"
        );
        Ok(expert)
    }

    /// Replace an expert's expertise and tags.
    ///
    /// The stored embedding is cleared first, so the profile is ineligible
    /// for semantic matching until a new one is stored.
    pub async fn update_profile(
        &self,
        expert_id: &str,
        expertise: Option<&str>,
        tags: &[String],
    ) -> AppResult<ExpertProfile> {
        let expertise = expertise.map(str::trim).filter(|e| !e.is_empty());
        let tags = resolve_tags(expertise, tags);

        let mut expert = self
            .store
            .update_expert_profile(expert_id, expertise, &tags)?;

        if let Some(embedding) = self.try_embed_tags(&expert).await {
            self.store.set_expert_embedding(&expert.id, &embedding)?;
            expert.tags_embedding = Some(embedding);
        }

        tracing::info!(expert_id, "Updated expert profile");
        Ok(expert)
    }

    /// Compute missing tag embeddings. Returns how many were stored.
    pub async fn refresh_embeddings(&self) -> AppResult<usize> {
        let mut refreshed = 0;
        for expert in self.store.list_experts()? {
            if expert.tags_embedding.is_some() || expert.expertise_tags.is_empty() {
                continue;
            }
            match self.embeddings.embed(&tag_text(&expert.expertise_tags)).await {
                Ok(embedding) => {
                    self.store.set_expert_embedding(&expert.id, &embedding)?;
                    refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!(expert_id = %expert.id, error = %e, "Could not embed expert tags");
                }
            }
        }
        Ok(refreshed)
    }

    pub fn list(&self) -> AppResult<Vec<ExpertProfile>> {
        self.store.list_experts()
    }

    pub fn get(&self, expert_id: &str) -> AppResult<ExpertProfile> {
        self.store
            .get_expert(expert_id)?
            .ok_or_else(|| AppError::NotFound(format!("Expert not found: {}", expert_id)))
    }

    /// Every expert except the asking user, in registration order.
    pub fn candidates_excluding(&self, user_id: &str) -> AppResult<Vec<ExpertProfile>> {
        Ok(self
            .store
            .list_experts()?
            .into_iter()
            .filter(|e| e.id != user_id)
            .collect())
    }

    async fn try_embed_tags(&self, expert: &ExpertProfile) -> Option<Vec<f32>> {
        if expert.expertise_tags.is_empty() {
            return None;
        }
        match self.embeddings.embed(&tag_text(&expert.expertise_tags)).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                tracing::warn!(expert_id = %expert.id, error = %e, "Could not embed expert tags");
                None
            }
        }
    }
}

fn resolve_tags(expertise: Option<&str>, tags: &[String]) -> Vec<String> {
    let tags = normalize_tags(tags);
    if !tags.is_empty() {
        return tags;
    }
    expertise.map(extract_expertise_tags).unwrap_or_default()
}
