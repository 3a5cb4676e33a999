//! Assess command handler.

use super::print_json;
use clap::Args;
use hivemind_core::AppResult;
use hivemind_experts::{CriterionScore, ExpertService};

/// Score an answer against the quality rubric
#[derive(Args, Debug)]
pub struct AssessCommand {
    /// The question being answered
    pub question: String,

    /// The candidate answer
    pub response: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AssessCommand {
    pub async fn execute(&self, service: &ExpertService) -> AppResult<()> {
        tracing::info!("Executing assess command");

        let assessment = service.assess_quality(&self.question, &self.response).await?;
        if self.json {
            return print_json(&assessment);
        }

        let criteria: [(&str, &CriterionScore); 5] = [
            ("Accuracy", &assessment.accuracy),
            ("Completeness", &assessment.completeness),
            ("Clarity", &assessment.clarity),
            ("Helpfulness", &assessment.helpfulness),
            ("Conciseness", &assessment.conciseness),
        ];
        for (name, criterion) in criteria {
            println!("{:<13} {:>4.1}/10  {}", name, criterion.score, criterion.feedback);
        }
        println!(
            "Overall       {:>4.0}/100 {}",
            assessment.overall.score, assessment.overall.feedback
        );

        if !assessment.suggestions.is_empty() {
            println!();
            println!("Suggestions:");
            for suggestion in &assessment.suggestions {
                println!("- {}", suggestion);
            }
        }

        println!();
        if assessment.passes_threshold {
            println!("Passes the quality gate");
        } else {
            println!("Below the quality gate; revise before submitting");
        }
        Ok(())
    }
}
