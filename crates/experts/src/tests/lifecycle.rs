use super::support::{config, FailingEmbedder, Harness};
use crate::types::{AssignmentStatus, RequestStatus};
use hivemind_core::AppError;
use serde_json::json;
use std::sync::Arc;

const QUESTION: &str = "What is a sensible default learning rate for Adam?";

async fn two_expert_request(harness: &Harness) -> (String, Vec<String>) {
    harness.add_expert("e1", &[], None);
    harness.add_expert("e2", &[], None);
    let created = harness.ask(QUESTION, &["Machine Learning"]).await;
    let ids = created.assignments.iter().map(|a| a.id.clone()).collect();
    (created.request.id, ids)
}

fn assert_invariants(harness: &Harness, request_id: &str) {
    let request = harness.request(request_id);
    let assignments = harness
        .service
        .assignments_for_request(request_id, None)
        .unwrap();

    assert!(request.completed_experts_count <= request.assigned_experts_count);
    let completed = assignments
        .iter()
        .filter(|a| a.status.counts_as_completed())
        .count() as u32;
    assert_eq!(request.completed_experts_count, completed);

    for assignment in &assignments {
        if assignment.status.requires_response() {
            assert!(assignment.response_text().is_some(), "{:?}", assignment);
        }
    }
}

#[tokio::test]
async fn test_empty_response_rejected_before_side_effects() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    let (request_id, ids) = two_expert_request(&harness).await;

    for response in [Some(""), Some("   "), None] {
        let err = harness
            .service
            .transition_assignment(&ids[0], "submitted", response, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    harness.service.drain_background().await;
    let assignment = harness.store().get_assignment(&ids[0]).unwrap().unwrap();
    assert_eq!(assignment.status, AssignmentStatus::Assigned);
    assert_eq!(harness.request(&request_id).completed_experts_count, 0);
    assert_eq!(harness.llm.calls(), 0);
}

#[tokio::test]
async fn test_invalid_status_and_unknown_assignment() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    let (_, ids) = two_expert_request(&harness).await;

    assert!(matches!(
        harness
            .service
            .transition_assignment(&ids[0], "finished", None, None)
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        harness
            .service
            .transition_assignment("missing", "working", None, None)
            .await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_counts_stay_consistent_across_transitions() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    let (request_id, ids) = two_expert_request(&harness).await;

    let steps: [(usize, &str, Option<&str>); 8] = [
        (0, "working", None),
        (0, "submitted", Some("Use 3e-4.")),
        (1, "submitted", Some("Start with 1e-3 and decay.")),
        (0, "working", None),
        (0, "submitted", None),
        (1, "rejected", None),
        (1, "working", None),
        (1, "submitted", Some("1e-3 with warmup.")),
    ];

    for (idx, status, response) in steps {
        harness
            .service
            .transition_assignment(&ids[idx], status, response, None)
            .await
            .unwrap();
        harness.service.drain_background().await;
        assert_invariants(&harness, &request_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submissions_both_count() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    let (request_id, ids) = two_expert_request(&harness).await;
    let before = harness.request(&request_id).completed_experts_count;

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let service = harness.service.clone();
            tokio::spawn(async move {
                service
                    .transition_assignment(&id, "submitted", Some("An answer."), None)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    harness.service.drain_background().await;

    let request = harness.request(&request_id);
    assert_eq!(request.completed_experts_count, before + 2);
    assert_eq!(request.assigned_experts_count, 2);
    assert_invariants(&harness, &request_id);
}

#[tokio::test]
async fn test_accept_awards_credits_once() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    let (request_id, ids) = two_expert_request(&harness).await;
    harness
        .store()
        .apply_transition(&ids[0], AssignmentStatus::Submitted, Some("Use 3e-4."), None)
        .unwrap();

    let accepted = harness
        .service
        .transition_assignment(&ids[0], "accepted", None, Some(40))
        .await
        .unwrap();
    assert_eq!(accepted.credits_awarded, Some(40));

    harness
        .service
        .transition_assignment(&ids[0], "accepted", None, Some(40))
        .await
        .unwrap();
    harness.service.drain_background().await;

    let expert = harness.service.get_expert("e1").unwrap();
    assert_eq!(expert.credits, 40);
    assert_eq!(expert.xp, 40);
    assert_eq!(harness.request(&request_id).status, RequestStatus::Completed);

    let level = harness.service.expert_level("e1").unwrap();
    assert_eq!(level.level, 1);
    assert_eq!(level.progress_to_next_level, 80);
}

#[tokio::test]
async fn test_negative_credits_rejected() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());
    let (_, ids) = two_expert_request(&harness).await;

    assert!(matches!(
        harness
            .service
            .transition_assignment(&ids[0], "accepted", Some("answer"), Some(-5))
            .await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_recheck_on_submit_blocks_failing_answers() {
    let mut config = config();
    config.quality.recheck_on_submit = true;
    let harness = Harness::new(Arc::new(FailingEmbedder), config);
    let (request_id, ids) = two_expert_request(&harness).await;

    harness.llm.push_object(json!({"overall": {"score": 50, "feedback": "vague"}}));
    let err = harness
        .service
        .transition_assignment(&ids[0], "submitted", Some("Something small."), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(harness.request(&request_id).completed_experts_count, 0);

    harness.llm.push_object(json!({"overall": {"score": 85, "feedback": "clear"}}));
    let submitted = harness
        .service
        .transition_assignment(&ids[0], "submitted", Some("Use 3e-4 with cosine decay."), None)
        .await
        .unwrap();
    assert_eq!(submitted.status, AssignmentStatus::Submitted);
    harness.service.drain_background().await;
    assert_invariants(&harness, &request_id);
}

#[tokio::test]
async fn test_quality_gate_boundary() {
    let harness = Harness::new(Arc::new(FailingEmbedder), config());

    for (score, passes) in [(69, false), (70, true)] {
        harness
            .llm
            .push_object(json!({"overall": {"score": score, "feedback": "ok"}}));
        let assessment = harness
            .service
            .assess_quality(QUESTION, "Start at 1e-3.")
            .await
            .unwrap();
        assert_eq!(assessment.passes_threshold, passes, "score {}", score);
    }
}
