//! Assignment lifecycle: assigned → working → submitted → accepted | rejected.

use crate::consensus::ConsensusEngine;
use crate::dispatch::BackgroundDispatcher;
use crate::quality::QualityAssessor;
use crate::rag::RagCorpusIndex;
use crate::store::Store;
use crate::types::{Assignment, AssignmentStatus};
use hivemind_core::{AppError, AppResult};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AssignmentStateMachine {
    store: Arc<Store>,
    consensus: ConsensusEngine,
    corpus: RagCorpusIndex,
    quality: QualityAssessor,
    recheck_on_submit: bool,
    dispatcher: BackgroundDispatcher,
}

impl AssignmentStateMachine {
    pub fn new(
        store: Arc<Store>,
        consensus: ConsensusEngine,
        corpus: RagCorpusIndex,
        quality: QualityAssessor,
        recheck_on_submit: bool,
        dispatcher: BackgroundDispatcher,
    ) -> Self {
        Self {
            store,
            consensus,
            corpus,
            quality,
            recheck_on_submit,
            dispatcher,
        }
    }

    /// Move an assignment to `new_status`.
    ///
    /// Counter and credit side effects are applied in one storage
    /// transaction. Entering `submitted` schedules a consensus evaluation of
    /// the request; entering `accepted` schedules embedding of the answer.
    /// Neither background task can fail the transition.
    #[tracing::instrument(skip(self, response), fields(status = %new_status))]
    pub async fn transition(
        &self,
        assignment_id: &str,
        new_status: AssignmentStatus,
        response: Option<&str>,
        credits_awarded: Option<i64>,
    ) -> AppResult<Assignment> {
        if credits_awarded.is_some_and(|c| c < 0) {
            return Err(AppError::Validation(
                "creditsAwarded cannot be negative".to_string(),
            ));
        }

        if self.recheck_on_submit && new_status == AssignmentStatus::Submitted {
            self.recheck(assignment_id, response).await?;
        }

        let record = self
            .store
            .apply_transition(assignment_id, new_status, response, credits_awarded)?;
        let assignment = record.assignment;

        tracing::info!(
            request_id = %assignment.request_id,
            expert_id = %assignment.expert_id,
            from = %record.previous,
            to = %assignment.status,
            "Assignment transitioned"
        );

        if new_status == AssignmentStatus::Submitted {
            let consensus = self.consensus.clone();
            let request_id = assignment.request_id.clone();
            self.dispatcher.spawn("consensus", async move {
                consensus.evaluate(&request_id).await.map(|_| ())
            });
        }

        if new_status == AssignmentStatus::Accepted && record.previous != AssignmentStatus::Accepted {
            let corpus = self.corpus.clone();
            let store = self.store.clone();
            let accepted = assignment.clone();
            self.dispatcher.spawn("embed-answer", async move {
                let request = store.get_request(&accepted.request_id)?.ok_or_else(|| {
                    AppError::NotFound(format!("Expert request not found: {}", accepted.request_id))
                })?;
                corpus.ensure_embedding(&accepted, &request.question).await.map(|_| ())
            });
        }

        Ok(assignment)
    }

    /// Re-run the quality assessment on the response about to be submitted.
    async fn recheck(&self, assignment_id: &str, response: Option<&str>) -> AppResult<()> {
        let current = self
            .store
            .get_assignment(assignment_id)?
            .ok_or_else(|| AppError::NotFound(format!("Assignment not found: {}", assignment_id)))?;
        let request = self.store.get_request(&current.request_id)?.ok_or_else(|| {
            AppError::NotFound(format!("Expert request not found: {}", current.request_id))
        })?;

        let text = match response {
            Some(text) if !text.trim().is_empty() => text,
            Some(_) => "",
            None => current.response_text().unwrap_or(""),
        };
        if text.is_empty() {
            return Err(AppError::Validation(format!(
                "A non-empty response is required for status '{}'",
                AssignmentStatus::Submitted
            )));
        }

        let assessment = self.quality.assess(&request.question, text).await?;
        if !assessment.passes_threshold {
            return Err(AppError::Validation(format!(
                "Response did not pass quality assessment: overall {} is below {}",
                assessment.overall.score,
                self.quality.pass_threshold()
            )));
        }
        Ok(())
    }
}
