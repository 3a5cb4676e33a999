//! Expert command handler.
//!
//! Registers experts, edits their profiles and shows their progress.

use super::{print_json, split_tags};
use clap::{Args, Subcommand};
use hivemind_core::AppResult;
use hivemind_experts::ExpertService;

/// Register and manage experts
#[derive(Args, Debug)]
pub struct ExpertCommand {
    #[command(subcommand)]
    pub action: ExpertAction,
}

#[derive(Subcommand, Debug)]
pub enum ExpertAction {
    /// Register a new expert
    Register {
        /// Contact email, unique per expert
        email: String,

        /// Free-text description of the expert's background
        #[arg(long)]
        expertise: Option<String>,

        /// Expertise tags (comma separated); extracted from --expertise when omitted
        #[arg(long)]
        tags: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace an expert's expertise and tags
    Update {
        expert_id: String,

        #[arg(long)]
        expertise: Option<String>,

        #[arg(long)]
        tags: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// List registered experts
    List {
        #[arg(long)]
        json: bool,
    },

    /// Compute missing tag embeddings
    Embed,

    /// Show an expert's level and progress
    Level {
        expert_id: String,

        #[arg(long)]
        json: bool,
    },
}

impl ExpertCommand {
    pub async fn execute(&self, service: &ExpertService) -> AppResult<()> {
        tracing::info!("Executing expert command");

        match &self.action {
            ExpertAction::Register {
                email,
                expertise,
                tags,
                json,
            } => {
                let expert = service
                    .register_expert(email, expertise.as_deref(), &split_tags(tags))
                    .await?;
                if *json {
                    return print_json(&expert);
                }
                println!("Registered expert {} <{}>", expert.id, expert.email);
                println!("Tags: {}", expert.expertise_tags.join(", "));
                if expert.tags_embedding.is_none() {
                    println!("No tag embedding yet; run `hivemind expert embed` to enable semantic matching.");
                }
            }
            ExpertAction::Update {
                expert_id,
                expertise,
                tags,
                json,
            } => {
                let expert = service
                    .update_expert_profile(expert_id, expertise.as_deref(), &split_tags(tags))
                    .await?;
                if *json {
                    return print_json(&expert);
                }
                println!("Updated expert {}", expert.id);
                println!("Tags: {}", expert.expertise_tags.join(", "));
            }
            ExpertAction::List { json } => {
                let experts = service.list_experts()?;
                if *json {
                    return print_json(&experts);
                }
                if experts.is_empty() {
                    println!("No experts registered");
                }
                for expert in experts {
                    println!(
                        "{}  {}  xp={} credits={}  [{}]",
                        expert.id,
                        expert.email,
                        expert.xp,
                        expert.credits,
                        expert.expertise_tags.join(", ")
                    );
                }
            }
            ExpertAction::Embed => {
                let refreshed = service.refresh_expert_embeddings().await?;
                println!("Embedded tags for {} expert(s)", refreshed);
            }
            ExpertAction::Level { expert_id, json } => {
                let level = service.expert_level(expert_id)?;
                if *json {
                    return print_json(&level);
                }
                println!(
                    "Level {} ({} xp, {}% to level {}, {} xp needed)",
                    level.level,
                    level.current_xp,
                    level.progress_to_next_level,
                    level.level + 1,
                    level.xp_needed_for_next_level
                );
            }
        }

        Ok(())
    }
}
