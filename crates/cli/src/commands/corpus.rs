//! Corpus command handler.
//!
//! Searches accepted expert answers, backfills their embeddings and exports
//! them as a training dataset.

use super::print_json;
use clap::{Args, Subcommand};
use hivemind_core::AppResult;
use hivemind_experts::ExpertService;

/// Search and maintain the accepted-answer corpus
#[derive(Args, Debug)]
pub struct CorpusCommand {
    #[command(subcommand)]
    pub action: CorpusAction,
}

#[derive(Subcommand, Debug)]
pub enum CorpusAction {
    /// Find accepted answers similar to a query
    Search {
        query: String,

        /// Maximum number of entries (default from config)
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Minimum cosine similarity (default from config)
        #[arg(long)]
        threshold: Option<f32>,

        #[arg(long)]
        json: bool,
    },

    /// Embed accepted answers that have no stored embedding
    Backfill {
        #[arg(long)]
        json: bool,
    },

    /// Export accepted answers with their questions as JSON
    Dataset,
}

impl CorpusCommand {
    pub async fn execute(&self, service: &ExpertService) -> AppResult<()> {
        tracing::info!("Executing corpus command");

        match &self.action {
            CorpusAction::Search {
                query,
                limit,
                threshold,
                json,
            } => {
                let entries = service.retrieve_context(query, *limit, *threshold).await?;
                if *json {
                    return print_json(&entries);
                }
                if entries.is_empty() {
                    println!("No matching expert answers");
                }
                for (i, entry) in entries.iter().enumerate() {
                    println!("[{}] {:.3}  {}", i + 1, entry.similarity, entry.question);
                    println!("{}", entry.answer.trim());
                    println!();
                }
            }
            CorpusAction::Backfill { json } => {
                let stats = service.backfill_corpus().await?;
                if *json {
                    return print_json(&stats);
                }
                println!(
                    "Scanned {} accepted answers: {} embedded, {} failed",
                    stats.scanned, stats.embedded, stats.failed
                );
            }
            CorpusAction::Dataset => {
                print_json(&service.dataset()?)?;
            }
        }

        Ok(())
    }
}
