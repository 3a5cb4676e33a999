//! Request command handler.

use super::print_json;
use clap::{Args, Subcommand};
use hivemind_core::AppResult;
use hivemind_experts::{ConsensusOutcome, ExpertService};

/// Inspect expert requests and run consensus
#[derive(Args, Debug)]
pub struct RequestCommand {
    #[command(subcommand)]
    pub action: RequestAction,
}

#[derive(Subcommand, Debug)]
pub enum RequestAction {
    /// List the requests of a chat
    List {
        chat_id: String,

        /// Owner of the chat
        #[arg(short, long, env = "HIVEMIND_USER")]
        user: String,

        #[arg(long)]
        json: bool,
    },

    /// Show stored and derived counters of requests
    Counts {
        #[arg(required = true)]
        request_ids: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Run a consensus evaluation now
    Evaluate {
        request_id: String,

        #[arg(long)]
        json: bool,
    },
}

impl RequestCommand {
    pub async fn execute(&self, service: &ExpertService) -> AppResult<()> {
        tracing::info!("Executing request command");

        match &self.action {
            RequestAction::List {
                chat_id,
                user,
                json,
            } => {
                let requests = service.requests_for_chat(user, chat_id)?;
                if *json {
                    return print_json(&requests);
                }
                for request in requests {
                    println!(
                        "{}  [{}]  {}  ({}/{} answered)",
                        request.id,
                        request.status,
                        request.title,
                        request.completed_experts_count,
                        request.assigned_experts_count
                    );
                }
            }
            RequestAction::Counts { request_ids, json } => {
                let counts = service.request_counts(request_ids)?;
                if *json {
                    return print_json(&counts);
                }
                for c in counts {
                    println!(
                        "{}  [{}]  assigned={} completed={} submitted={} accepted={} rows={}",
                        c.request_id,
                        c.status,
                        c.assigned_experts_count,
                        c.completed_experts_count,
                        c.submitted,
                        c.accepted,
                        c.total_assignments
                    );
                }
            }
            RequestAction::Evaluate { request_id, json } => {
                let outcome = service.evaluate_request(request_id).await?;
                if *json {
                    return print_json(&outcome);
                }
                match outcome {
                    ConsensusOutcome::NoSubmissions => println!("No submitted responses to evaluate"),
                    ConsensusOutcome::Disagreement { responses } => {
                        println!("The {} submitted responses disagree; waiting for more input", responses)
                    }
                    ConsensusOutcome::Completed {
                        message_id,
                        accepted,
                    } => {
                        println!("Consensus reached; accepted {} response(s)", accepted);
                        match message_id {
                            Some(id) => println!("Synthesized answer saved as message {}", id),
                            None => println!("No synthesized answer was produced"),
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
