use super::support::{at_similarity, config, FailingEmbedder, FixedEmbedder, Harness, QUERY};
use crate::types::RequestStatus;
use std::sync::Arc;

const ML_QUESTION: &str = "How should I choose a learning rate for fine-tuning?";

fn ml_embedder() -> Arc<FixedEmbedder> {
    Arc::new(FixedEmbedder::new().with("Machine Learning", QUERY.to_vec()))
}

fn assigned_ids(created: &crate::service::CreatedRequest) -> Vec<String> {
    created
        .assignments
        .iter()
        .map(|a| a.expert_id.clone())
        .collect()
}

#[tokio::test]
async fn test_semantic_tier_assigns_everyone_above_threshold() {
    let harness = Harness::new(ml_embedder(), config());
    harness.add_expert("e90", &["Machine Learning"], Some(at_similarity(0.9)));
    harness.add_expert("e75", &["Data Science"], Some(at_similarity(0.75)));
    harness.add_expert("e50", &["Statistics"], Some(at_similarity(0.5)));

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(assigned_ids(&created), vec!["e90", "e75"]);
    assert_eq!(created.request.assigned_experts_count, 2);
    assert_eq!(created.request.status, RequestStatus::InProgress);
}

#[tokio::test]
async fn test_best_match_when_nobody_clears_threshold() {
    let mut config = config();
    config.matching.similarity_threshold = 0.95;
    let harness = Harness::new(ml_embedder(), config);
    harness.add_expert("e90", &["Machine Learning"], Some(at_similarity(0.9)));
    harness.add_expert("e75", &["Data Science"], Some(at_similarity(0.75)));
    harness.add_expert("e50", &["Statistics"], Some(at_similarity(0.5)));

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(assigned_ids(&created), vec!["e90"]);
    assert_eq!(created.request.assigned_experts_count, 1);
}

#[tokio::test]
async fn test_single_close_candidate_is_assigned() {
    let harness = Harness::new(ml_embedder(), config());
    harness.add_expert("ml", &["Machine Learning"], Some(at_similarity(0.82)));

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(created.assignments.len(), 1);
    assert_eq!(created.request.status, RequestStatus::InProgress);
    assert_eq!(created.request.assigned_experts_count, 1);
    assert_eq!(created.request.title, "Test request");
}

#[tokio::test]
async fn test_embedding_failure_falls_back_to_generic() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    harness.add_expert("a", &["Machine Learning"], Some(at_similarity(0.9)));
    harness.add_expert("b", &["Finance"], Some(at_similarity(0.1)));
    harness.add_expert("c", &[], None);

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(assigned_ids(&created), vec!["a", "b", "c"]);
    assert_eq!(created.request.assigned_experts_count, 3);
}

#[tokio::test]
async fn test_generic_fallback_respects_cap() {
    let mut config = config();
    config.matching.max_fallback_experts = Some(2);
    let harness = Harness::new(Arc::new(FixedEmbedder::new()), config);
    harness.add_expert("a", &[], None);
    harness.add_expert("b", &[], None);
    harness.add_expert("c", &[], None);

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(assigned_ids(&created), vec!["a", "b"]);
}

#[tokio::test]
async fn test_no_embeddings_skips_semantic_tier() {
    let embedder = ml_embedder();
    let harness = Harness::new(embedder.clone(), config());
    harness.add_expert("a", &["Machine Learning"], None);

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(assigned_ids(&created), vec!["a"]);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_asker_is_never_assigned() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    harness.add_expert("other", &[], None);

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert_eq!(assigned_ids(&created), vec!["other"]);
}

#[tokio::test]
async fn test_empty_pool_leaves_request_pending() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());

    let created = harness.ask(ML_QUESTION, &["Machine Learning"]).await;

    assert!(created.assignments.is_empty());
    assert_eq!(created.request.status, RequestStatus::Pending);
    assert_eq!(created.request.assigned_experts_count, 0);
}
