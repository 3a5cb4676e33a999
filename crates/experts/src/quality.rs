//! Rubric-based quality assessment of expert answers.

use crate::prompts::render_request;
use crate::types::{CriterionScore, QualityAssessment};
use hivemind_core::config::QualityConfig;
use hivemind_core::{AppError, AppResult};
use hivemind_llm::{generate_object, ModelBinding};
use hivemind_prompt::PromptDefinition;
use serde_json::{json, Value};

const DEFAULT_FEEDBACK: &str = "Default evaluation";

/// Assessment returned when the provider cannot be used.
pub fn default_assessment() -> QualityAssessment {
    let criterion = || CriterionScore::new(7.0, DEFAULT_FEEDBACK);
    QualityAssessment {
        accuracy: criterion(),
        completeness: criterion(),
        clarity: criterion(),
        helpfulness: criterion(),
        conciseness: criterion(),
        overall: CriterionScore::new(75.0, DEFAULT_FEEDBACK),
        suggestions: vec!["Improve where needed".to_string()],
        passes_threshold: true,
    }
}

/// Read `{score, feedback}` from `value[key]`, clamping the score to `0..=max`.
fn criterion(value: &Value, key: &str, max: f32) -> Option<CriterionScore> {
    let entry = value.get(key)?;
    let score = entry.get("score")?.as_f64()? as f32;
    let feedback = entry.get("feedback")?.as_str()?;
    Some(CriterionScore::new(score.clamp(0.0, max), feedback))
}

/// Overlay every complete criterion of a partial object onto `base`.
fn merge_partial(base: &QualityAssessment, value: &Value) -> QualityAssessment {
    let mut merged = base.clone();
    let slots = [
        ("accuracy", &mut merged.accuracy),
        ("completeness", &mut merged.completeness),
        ("clarity", &mut merged.clarity),
        ("helpfulness", &mut merged.helpfulness),
        ("conciseness", &mut merged.conciseness),
    ];
    for (key, slot) in slots {
        if let Some(score) = criterion(value, key, 10.0) {
            *slot = score;
        }
    }
    if let Some(overall) = criterion(value, "overall", 100.0) {
        merged.overall = overall;
    }
    if let Some(suggestions) = value.get("suggestions").and_then(Value::as_array) {
        merged.suggestions = suggestions
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    merged
}

/// Scores a candidate answer against its question.
#[derive(Debug, Clone)]
pub struct QualityAssessor {
    model: ModelBinding,
    prompt: PromptDefinition,
    pass_threshold: u32,
    min_question_chars: usize,
}

impl QualityAssessor {
    pub fn new(model: ModelBinding, prompt: PromptDefinition, config: &QualityConfig) -> Self {
        Self {
            model,
            prompt,
            pass_threshold: config.pass_threshold,
            min_question_chars: config.min_question_chars,
        }
    }

    pub fn pass_threshold(&self) -> u32 {
        self.pass_threshold
    }

    /// Assess `response` as an answer to `question`.
    ///
    /// Questions shorter than the configured minimum, provider failures and
    /// empty provider output all yield [`default_assessment`]. Blank inputs
    /// are a validation error.
    pub async fn assess(&self, question: &str, response: &str) -> AppResult<QualityAssessment> {
        if question.trim().is_empty() || response.trim().is_empty() {
            return Err(AppError::Validation(
                "Both question and response are required".to_string(),
            ));
        }

        if question.chars().count() < self.min_question_chars {
            tracing::debug!(
                question_chars = question.chars().count(),
                min = self.min_question_chars,
                "Question below minimum length, using default assessment"
            );
            return Ok(default_assessment());
        }

        let request = render_request(
            &self.model,
            &self.prompt,
            json!({ "question": question, "response": response }),
            None,
        )?
        .with_max_tokens(1000);

        let base = default_assessment();
        let folded = generate_object(self.model.client.as_ref(), &request, |value| {
            Some(merge_partial(&base, value))
        })
        .await;

        let mut assessment = match folded {
            Ok(Some(assessment)) => assessment,
            Ok(None) => {
                tracing::warn!("Quality provider returned no object, using default assessment");
                return Ok(default_assessment());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Quality assessment failed, using default assessment");
                return Ok(default_assessment());
            }
        };

        assessment.passes_threshold = assessment.overall.score >= self.pass_threshold as f32;
        tracing::info!(
            overall = assessment.overall.score,
            passes = assessment.passes_threshold,
            "Assessed answer quality"
        );
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_llm::ScriptedClient;
    use hivemind_prompt::builtin::{builtin_prompt, QUALITY};
    use std::sync::Arc;

    fn assessor(client: Arc<ScriptedClient>) -> QualityAssessor {
        QualityAssessor::new(
            ModelBinding::new(client, "quality"),
            builtin_prompt(QUALITY).unwrap(),
            &QualityConfig {
                pass_threshold: 70,
                min_question_chars: 10,
                recheck_on_submit: false,
            },
        )
    }

    fn rubric(overall: f64) -> Value {
        json!({
            "accuracy": {"score": 8, "feedback": "correct"},
            "completeness": {"score": 6, "feedback": "misses edge cases"},
            "clarity": {"score": 9, "feedback": "clear"},
            "helpfulness": {"score": 7, "feedback": "actionable"},
            "conciseness": {"score": 12, "feedback": "tight"},
            "overall": {"score": overall, "feedback": "solid"},
            "suggestions": ["Add an example"]
        })
    }

    #[tokio::test]
    async fn test_parses_provider_rubric() {
        let client = Arc::new(ScriptedClient::new());
        client.push_object(rubric(82.0));

        let assessment = assessor(client.clone())
            .assess("How should I pick a learning rate?", "Start at 3e-4 and sweep.")
            .await
            .unwrap();

        assert_eq!(assessment.accuracy.score, 8.0);
        assert_eq!(assessment.completeness.feedback, "misses edge cases");
        assert_eq!(assessment.conciseness.score, 10.0);
        assert_eq!(assessment.suggestions, vec!["Add an example".to_string()]);
        assert!(assessment.passes_threshold);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_criteria_keep_defaults() {
        let client = Arc::new(ScriptedClient::new());
        client.push_object(json!({"accuracy": {"score": 3, "feedback": "wrong"}, "clarity": {"score": 9}}));

        let assessment = assessor(client)
            .assess("How should I pick a learning rate?", "Use 10.")
            .await
            .unwrap();

        assert_eq!(assessment.accuracy, CriterionScore::new(3.0, "wrong"));
        assert_eq!(assessment.clarity, CriterionScore::new(7.0, DEFAULT_FEEDBACK));
        assert_eq!(assessment.overall.score, 75.0);
    }

    #[tokio::test]
    async fn test_provider_failure_returns_default() {
        let client = Arc::new(ScriptedClient::new());
        client.push_failure("model offline");

        let assessment = assessor(client)
            .assess("How should I pick a learning rate?", "Sweep it.")
            .await
            .unwrap();
        assert_eq!(assessment, default_assessment());
    }

    #[tokio::test]
    async fn test_short_question_skips_provider() {
        let client = Arc::new(ScriptedClient::new());

        let assessment = assessor(client.clone()).assess("LR?", "3e-4").await.unwrap();
        assert_eq!(assessment, default_assessment());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_response_is_validation_error() {
        let client = Arc::new(ScriptedClient::new());
        let err = assessor(client)
            .assess("How should I pick a learning rate?", "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
