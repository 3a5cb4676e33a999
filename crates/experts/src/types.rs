//! Domain types for expert routing.

use chrono::{DateTime, Utc};
use hivemind_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered user who can answer questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertProfile {
    pub id: String,
    pub email: String,
    /// Free-text description of the user's expertise
    pub expertise: Option<String>,
    pub expertise_tags: Vec<String>,
    /// Embedding of the joined tag set; absent means ineligible for semantic matching
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_embedding: Option<Vec<f32>>,
    pub credits: i64,
    pub xp: i64,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a community question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(AppError::Validation(format!(
                "Invalid request status: {}",
                other
            ))),
        }
    }
}

/// A question routed to the expert community.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertRequest {
    pub id: String,
    pub chat_id: String,
    pub title: String,
    pub question: String,
    pub expertise_tags: Vec<String>,
    pub status: RequestStatus,
    pub assigned_experts_count: u32,
    pub completed_experts_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of one expert's work on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Working,
    Submitted,
    Accepted,
    Rejected,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 5] = [
        Self::Assigned,
        Self::Working,
        Self::Submitted,
        Self::Accepted,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Working => "working",
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a status name; unknown names are a validation error.
    pub fn parse(s: &str) -> AppResult<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid assignment status '{}'. Expected one of: assigned, working, submitted, accepted, rejected",
                    s
                ))
            })
    }

    /// Statuses that must carry a non-empty response.
    pub fn requires_response(&self) -> bool {
        matches!(self, Self::Submitted | Self::Accepted | Self::Rejected)
    }

    /// Statuses counted in `completed_experts_count`.
    pub fn counts_as_completed(&self) -> bool {
        matches!(self, Self::Submitted | Self::Accepted)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One expert paired with one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub request_id: String,
    pub expert_id: String,
    pub status: AssignmentStatus,
    pub response: Option<String>,
    pub rating: Option<u8>,
    pub credits_awarded: Option<i64>,
    #[serde(skip_serializing)]
    pub response_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    /// The response text, if present and non-blank.
    pub fn response_text(&self) -> Option<&str> {
        self.response
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Result of applying a transition in storage.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub previous: AssignmentStatus,
    pub assignment: Assignment,
}

/// An assignment joined with its request, as shown to the expert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub chat_id: String,
    pub title: String,
    pub question: String,
    pub request_status: RequestStatus,
    pub assigned_experts_count: u32,
    pub completed_experts_count: u32,
}

/// A conversation owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(AppError::Validation(format!("Invalid message role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Score and feedback for one rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f32,
    pub feedback: String,
}

impl CriterionScore {
    pub fn new(score: f32, feedback: impl Into<String>) -> Self {
        Self {
            score,
            feedback: feedback.into(),
        }
    }
}

/// Rubric evaluation of a candidate answer. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    pub accuracy: CriterionScore,
    pub completeness: CriterionScore,
    pub clarity: CriterionScore,
    pub helpfulness: CriterionScore,
    pub conciseness: CriterionScore,
    /// Overall score on a 0-100 scale
    pub overall: CriterionScore,
    pub suggestions: Vec<String>,
    pub passes_threshold: bool,
}

/// An accepted answer matched against a query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagEntry {
    pub assignment_id: String,
    pub question: String,
    pub answer: String,
    pub similarity: f32,
}

/// Counters of a request together with counts derived from its assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCounts {
    pub request_id: String,
    pub status: RequestStatus,
    pub assigned_experts_count: u32,
    pub completed_experts_count: u32,
    pub total_assignments: u32,
    pub submitted: u32,
    pub accepted: u32,
}

/// One accepted answer in the training dataset projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRecord {
    pub request_id: String,
    pub title: String,
    pub question: String,
    pub expertise_tags: Vec<String>,
    pub assignment_id: String,
    pub expert_id: String,
    pub expert_email: String,
    pub response: String,
    pub rating: Option<u8>,
    pub credits_awarded: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub records: Vec<DatasetRecord>,
    pub accepted_per_request: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_status_parse() {
        assert_eq!(
            AssignmentStatus::parse("submitted").unwrap(),
            AssignmentStatus::Submitted
        );
        assert_eq!(
            AssignmentStatus::parse(" Accepted ").unwrap(),
            AssignmentStatus::Accepted
        );
        assert!(matches!(
            AssignmentStatus::parse("done"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in AssignmentStatus::ALL {
            assert_eq!(AssignmentStatus::parse(status.as_str()).unwrap(), status);
        }
        for status in [
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestStatus::Completed,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_response_requirements() {
        assert!(!AssignmentStatus::Assigned.requires_response());
        assert!(!AssignmentStatus::Working.requires_response());
        assert!(AssignmentStatus::Submitted.requires_response());
        assert!(AssignmentStatus::Rejected.requires_response());

        assert!(AssignmentStatus::Submitted.counts_as_completed());
        assert!(AssignmentStatus::Accepted.counts_as_completed());
        assert!(!AssignmentStatus::Rejected.counts_as_completed());
    }

    #[test]
    fn test_response_text_ignores_blank() {
        let now = Utc::now();
        let mut assignment = Assignment {
            id: "a".into(),
            request_id: "r".into(),
            expert_id: "e".into(),
            status: AssignmentStatus::Working,
            response: Some("   ".into()),
            rating: None,
            credits_awarded: None,
            response_embedding: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(assignment.response_text(), None);

        assignment.response = Some(" answer ".into());
        assert_eq!(assignment.response_text(), Some("answer"));
    }

    #[test]
    fn test_assessment_serializes_camel_case() {
        let assessment = QualityAssessment {
            accuracy: CriterionScore::new(8.0, "ok"),
            completeness: CriterionScore::new(8.0, "ok"),
            clarity: CriterionScore::new(8.0, "ok"),
            helpfulness: CriterionScore::new(8.0, "ok"),
            conciseness: CriterionScore::new(8.0, "ok"),
            overall: CriterionScore::new(80.0, "good"),
            suggestions: vec![],
            passes_threshold: true,
        };
        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json["passesThreshold"], true);
    }
}
