//! Request-to-expert matching.
//!
//! Tiers are tried in order and the first that selects anyone wins:
//! 1. semantic: every candidate whose tag embedding scores at or above the
//!    threshold against the request's tags;
//! 2. best match: the single highest-scoring candidate from tier 1;
//! 3. generic: candidates in listed order, up to the fallback cap.

use crate::embeddings::EmbeddingGateway;
use crate::store::Store;
use crate::tags::tag_text;
use crate::types::{Assignment, ExpertProfile, ExpertRequest};
use hivemind_core::config::MatchingConfig;
use hivemind_core::AppResult;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Semantic,
    BestMatch,
    Generic,
}

/// One selected candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedExpert {
    pub expert_id: String,
    /// Similarity to the request tags; `None` for generic picks
    pub similarity: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPlan {
    pub tier: MatchTier,
    pub experts: Vec<MatchedExpert>,
}

/// Split scored candidates into those at or above `threshold` and the best
/// one below it. Ties keep the earlier candidate.
pub fn select_semantic(scores: &[f32], threshold: f32) -> (Vec<usize>, Option<usize>) {
    let mut selected = Vec::new();
    let mut best: Option<usize> = None;

    for (idx, &score) in scores.iter().enumerate() {
        if score >= threshold {
            selected.push(idx);
        } else if best.map_or(true, |b| score > scores[b]) {
            best = Some(idx);
        }
    }

    (selected, best)
}

#[derive(Debug, Clone)]
pub struct MatchingEngine {
    store: Arc<Store>,
    embeddings: EmbeddingGateway,
    similarity_threshold: f32,
    max_fallback_experts: Option<usize>,
}

impl MatchingEngine {
    pub fn new(store: Arc<Store>, embeddings: EmbeddingGateway, config: &MatchingConfig) -> Self {
        Self {
            store,
            embeddings,
            similarity_threshold: config.similarity_threshold,
            max_fallback_experts: config.max_fallback_experts,
        }
    }

    /// Decide who should answer a request with `tags`.
    pub async fn plan(&self, tags: &[String], candidates: &[ExpertProfile]) -> MatchPlan {
        if let Some(plan) = self.plan_semantic(tags, candidates).await {
            return plan;
        }

        let cap = self
            .max_fallback_experts
            .unwrap_or(candidates.len())
            .min(candidates.len());
        MatchPlan {
            tier: MatchTier::Generic,
            experts: candidates
                .iter()
                .take(cap)
                .map(|c| MatchedExpert {
                    expert_id: c.id.clone(),
                    similarity: None,
                })
                .collect(),
        }
    }

    async fn plan_semantic(
        &self,
        tags: &[String],
        candidates: &[ExpertProfile],
    ) -> Option<MatchPlan> {
        let embedded: Vec<(&ExpertProfile, &Vec<f32>)> = candidates
            .iter()
            .filter_map(|c| c.tags_embedding.as_ref().map(|e| (c, e)))
            .collect();
        if tags.is_empty() || embedded.is_empty() {
            return None;
        }

        let request_embedding = match self.embeddings.embed(&tag_text(tags)).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "Tag embedding failed, falling back to generic matching");
                return None;
            }
        };

        let scores: Vec<f32> = embedded
            .iter()
            .map(|(_, e)| self.embeddings.similarity(&request_embedding, e))
            .collect();
        let (selected, best) = select_semantic(&scores, self.similarity_threshold);

        let pick = |idx: usize| MatchedExpert {
            expert_id: embedded[idx].0.id.clone(),
            similarity: Some(scores[idx]),
        };

        if !selected.is_empty() {
            return Some(MatchPlan {
                tier: MatchTier::Semantic,
                experts: selected.into_iter().map(pick).collect(),
            });
        }

        best.map(|idx| {
            tracing::debug!(similarity = scores[idx], "No candidate above threshold, using best match");
            MatchPlan {
                tier: MatchTier::BestMatch,
                experts: vec![pick(idx)],
            }
        })
    }

    /// Create assignments for `request` from `candidates`.
    ///
    /// Pairs that already have an assignment are skipped.
    #[tracing::instrument(skip(self, request, candidates), fields(request_id = %request.id))]
    pub async fn assign(
        &self,
        request: &ExpertRequest,
        candidates: &[ExpertProfile],
    ) -> AppResult<Vec<Assignment>> {
        let plan = self.plan(&request.expertise_tags, candidates).await;

        let mut created = Vec::with_capacity(plan.experts.len());
        for matched in &plan.experts {
            if let Some(assignment) =
                self.store
                    .create_assignment(&request.id, &matched.expert_id, Some(&request.title))?
            {
                created.push(assignment);
            }
        }

        tracing::info!(
            tier = ?plan.tier,
            candidates = candidates.len(),
            assigned = created.len(),
            "Assigned experts"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_above_threshold() {
        let (selected, best) = select_semantic(&[0.9, 0.75, 0.5], 0.7);
        assert_eq!(selected, vec![0, 1]);
        assert_eq!(best, Some(2));
    }

    #[test]
    fn test_select_best_below_threshold() {
        let (selected, best) = select_semantic(&[0.9, 0.75, 0.5], 0.95);
        assert!(selected.is_empty());
        assert_eq!(best, Some(0));
    }

    #[test]
    fn test_ties_keep_first() {
        let (_, best) = select_semantic(&[0.4, 0.6, 0.6], 0.7);
        assert_eq!(best, Some(1));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (selected, _) = select_semantic(&[0.7], 0.7);
        assert_eq!(selected, vec![0]);
    }

    #[test]
    fn test_empty_scores() {
        assert_eq!(select_semantic(&[], 0.7), (vec![], None));
    }
}
