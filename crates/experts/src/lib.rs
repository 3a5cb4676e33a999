//! Expert routing core for Hivemind.
//!
//! Routes community questions to human experts and turns their answers into
//! trusted responses:
//! - **Matching**: semantic tag matching with best-match and generic fallbacks
//! - **Assignments**: lifecycle transitions with atomic counter updates
//! - **Consensus**: agreement check and synthesis of submitted answers
//! - **Corpus**: accepted answers as retrieval context for AI answers
//! - **Quality**: rubric scoring used as a gate before submission
//!
//! # Example
//! ```no_run
//! use hivemind_core::AppConfig;
//! use hivemind_experts::{ExpertService, NewExpertRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let service = ExpertService::from_config(&config)?;
//! let created = service
//!     .create_expert_request(NewExpertRequest {
//!         user_id: "user-1".to_string(),
//!         question: "How do I choose a learning rate?".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("Assigned {} experts", created.assignments.len());
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod consensus;
pub mod directory;
pub mod dispatch;
pub mod embeddings;
pub mod intake;
pub mod level;
pub mod matching;
pub mod prompts;
pub mod quality;
pub mod rag;
pub mod service;
pub mod store;
pub mod tags;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export main types
pub use assignment::AssignmentStateMachine;
pub use consensus::{ConsensusEngine, ConsensusOutcome};
pub use directory::ExpertDirectory;
pub use dispatch::BackgroundDispatcher;
pub use embeddings::{cosine_similarity, EmbeddingGateway, EmbeddingProvider};
pub use level::LevelInfo;
pub use matching::{MatchPlan, MatchTier, MatchingEngine};
pub use quality::QualityAssessor;
pub use rag::{BackfillStats, RagCorpusIndex};
pub use service::{AiAnswer, AskAi, CreatedRequest, ExpertService, NewExpertRequest, PreparedAnswer};
pub use store::Store;
pub use types::*;
