//! Consensus over submitted expert answers.
//!
//! `evaluate` is safe to run repeatedly: it only acts on assignments that are
//! still `submitted`, and evaluations of the same request are serialized so
//! two background runs never synthesize the same submissions twice.
//! Evaluations of different requests run independently.

use crate::prompts::render_request;
use crate::rag::RagCorpusIndex;
use crate::store::Store;
use crate::types::{AssignmentStatus, ExpertRequest, MessageRole};
use hivemind_core::{AppError, AppResult};
use hivemind_llm::{generate_object, ModelBinding};
use hivemind_prompt::PromptDefinition;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsensusOutcome {
    /// No submitted responses to evaluate.
    NoSubmissions,
    /// Responses were judged to disagree; nothing changed.
    Disagreement { responses: usize },
    /// The request was completed and its submissions accepted.
    Completed {
        message_id: Option<String>,
        accepted: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    store: Arc<Store>,
    corpus: RagCorpusIndex,
    agreement_model: ModelBinding,
    synthesis_model: ModelBinding,
    agreement_prompt: Arc<PromptDefinition>,
    synthesis_prompt: Arc<PromptDefinition>,
    gates: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

fn numbered(responses: &[String]) -> Value {
    Value::Array(
        responses
            .iter()
            .enumerate()
            .map(|(i, text)| json!({ "number": i + 1, "text": text }))
            .collect(),
    )
}

impl ConsensusEngine {
    pub fn new(
        store: Arc<Store>,
        corpus: RagCorpusIndex,
        agreement_model: ModelBinding,
        synthesis_model: ModelBinding,
        agreement_prompt: PromptDefinition,
        synthesis_prompt: PromptDefinition,
    ) -> Self {
        Self {
            store,
            corpus,
            agreement_model,
            synthesis_model,
            agreement_prompt: Arc::new(agreement_prompt),
            synthesis_prompt: Arc::new(synthesis_prompt),
            gates: Arc::default(),
        }
    }

    /// Lock for one request. Entries nobody holds are pruned on the way in.
    async fn lock_request(&self, request_id: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self
                .gates
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            gates.entry(request_id.to_string()).or_default().clone()
        };
        gate.lock_owned().await
    }

    /// Evaluate the submitted answers of a request.
    #[tracing::instrument(skip(self))]
    pub async fn evaluate(&self, request_id: &str) -> AppResult<ConsensusOutcome> {
        let _guard = self.lock_request(request_id).await;

        let request = self
            .store
            .get_request(request_id)?
            .ok_or_else(|| AppError::NotFound(format!("Expert request not found: {}", request_id)))?;

        let submitted = self
            .store
            .list_assignments(request_id, Some(AssignmentStatus::Submitted))?;
        let responses: Vec<String> = submitted
            .iter()
            .filter_map(|a| a.response_text())
            .map(str::to_string)
            .collect();

        if responses.is_empty() {
            tracing::debug!("No submitted responses");
            return Ok(ConsensusOutcome::NoSubmissions);
        }

        if !self.agree(&request, &responses).await {
            tracing::info!(responses = responses.len(), "Expert responses disagree");
            return Ok(ConsensusOutcome::Disagreement {
                responses: responses.len(),
            });
        }

        let message_id = match self.synthesize(&request, &responses).await {
            Some(answer) => {
                match self
                    .store
                    .append_message(&request.chat_id, MessageRole::Assistant, &answer)
                {
                    Ok(message) => Some(message.id),
                    Err(e) => {
                        tracing::error!(chat_id = %request.chat_id, error = %e, "Failed to save synthesized answer");
                        None
                    }
                }
            }
            None => None,
        };

        let accepted = self.store.complete_request(request_id)?;

        for assignment in &accepted {
            if let Err(e) = self
                .corpus
                .ensure_embedding(assignment, &request.question)
                .await
            {
                tracing::error!(
                    assignment_id = %assignment.id,
                    error = %e,
                    "Failed to embed accepted answer"
                );
            }
        }

        tracing::info!(
            accepted = accepted.len(),
            synthesized = message_id.is_some(),
            "Consensus reached"
        );
        Ok(ConsensusOutcome::Completed {
            message_id,
            accepted: accepted.len(),
        })
    }

    /// One response agrees with itself. Otherwise ask the agreement model;
    /// any failure counts as disagreement.
    async fn agree(&self, request: &ExpertRequest, responses: &[String]) -> bool {
        if responses.len() == 1 {
            return true;
        }

        let request = match render_request(
            &self.agreement_model,
            &self.agreement_prompt,
            json!({ "question": request.question, "responses": numbered(responses) }),
            None,
        ) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render agreement prompt");
                return false;
            }
        };

        let verdict = generate_object(self.agreement_model.client.as_ref(), &request, |value| {
            let agreement = value.get("agreement")?.as_bool()?;
            let justification = value.get("justification")?.as_str()?;
            Some((agreement, justification.to_string()))
        })
        .await;

        match verdict {
            Ok(Some((agreement, justification))) => {
                tracing::debug!(agreement, justification = %justification, "Agreement verdict");
                agreement
            }
            Ok(None) => {
                tracing::warn!("Agreement check returned no verdict, treating as disagreement");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Agreement check failed, treating as disagreement");
                false
            }
        }
    }

    async fn synthesize(&self, request: &ExpertRequest, responses: &[String]) -> Option<String> {
        let llm_request = match render_request(
            &self.synthesis_model,
            &self.synthesis_prompt,
            json!({ "question": request.question, "responses": numbered(responses) }),
            None,
        ) {
            Ok(llm_request) => llm_request,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render synthesis prompt");
                return None;
            }
        };

        let synthesized = generate_object(self.synthesis_model.client.as_ref(), &llm_request, |value| {
            value
                .get("synthesizedResponse")?
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        })
        .await;

        match synthesized {
            Ok(Some(answer)) => Some(answer),
            Ok(None) => {
                tracing::warn!(request_id = %request.id, "Synthesis produced no answer");
                None
            }
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "Synthesis failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_responses() {
        let value = numbered(&["a".to_string(), "b".to_string()]);
        assert_eq!(
            value,
            json!([{"number": 1, "text": "a"}, {"number": 2, "text": "b"}])
        );
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let value = serde_json::to_value(ConsensusOutcome::Disagreement { responses: 2 }).unwrap();
        assert_eq!(value, json!({"outcome": "disagreement", "responses": 2}));
    }
}
