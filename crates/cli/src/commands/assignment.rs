//! Assignment command handler.
//!
//! Lets an expert list their work, move assignments through their
//! lifecycle and rate answers.

use super::print_json;
use clap::{Args, Subcommand};
use hivemind_core::AppResult;
use hivemind_experts::ExpertService;

/// Work on assignments
#[derive(Args, Debug)]
pub struct AssignmentCommand {
    #[command(subcommand)]
    pub action: AssignmentAction,
}

#[derive(Subcommand, Debug)]
pub enum AssignmentAction {
    /// List an expert's assignments with their questions
    List {
        /// Expert id
        #[arg(short, long, env = "HIVEMIND_USER")]
        expert: String,

        #[arg(long)]
        json: bool,
    },

    /// Move an assignment to a new status
    Transition {
        assignment_id: String,

        /// assigned, working, submitted, accepted or rejected
        status: String,

        /// Response text; required when entering submitted, accepted or rejected without one
        #[arg(short, long)]
        response: Option<String>,

        /// Credits to award when accepting
        #[arg(long)]
        credits: Option<i64>,

        #[arg(long)]
        json: bool,
    },

    /// Rate an answer from 1 to 5
    Rate {
        assignment_id: String,

        rating: u8,
    },
}

impl AssignmentCommand {
    pub async fn execute(&self, service: &ExpertService) -> AppResult<()> {
        tracing::info!("Executing assignment command");

        match &self.action {
            AssignmentAction::List { expert, json } => {
                let views = service.assignments_for_expert(expert)?;
                if *json {
                    return print_json(&views);
                }
                if views.is_empty() {
                    println!("No assignments for {}", expert);
                }
                for view in views {
                    println!(
                        "{}  [{}]  {}  ({}/{} answered)",
                        view.assignment.id,
                        view.assignment.status,
                        view.title,
                        view.completed_experts_count,
                        view.assigned_experts_count
                    );
                }
            }
            AssignmentAction::Transition {
                assignment_id,
                status,
                response,
                credits,
                json,
            } => {
                let assignment = service
                    .transition_assignment(assignment_id, status, response.as_deref(), *credits)
                    .await?;
                if *json {
                    return print_json(&assignment);
                }
                println!("Assignment {} is now {}", assignment.id, assignment.status);
            }
            AssignmentAction::Rate {
                assignment_id,
                rating,
            } => {
                let assignment = service.rate_assignment(assignment_id, *rating)?;
                println!("Rated assignment {} with {}", assignment.id, rating);
            }
        }

        Ok(())
    }
}
