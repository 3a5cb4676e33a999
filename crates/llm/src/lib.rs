//! LLM integration crate for Hivemind.
//!
//! Provides a provider-agnostic abstraction over language models: plain
//! completion, text streaming and structured JSON objects streamed as a
//! sequence of partial values. Components resolve models through a
//! `ModelRegistry` keyed by logical role.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Scripted**: Deterministic canned replies for tests and offline runs
//!
//! # Example
//! ```no_run
//! use hivemind_llm::{generate_object, LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Is the sky blue? Reply as {\"answer\": bool}", "llama3.2");
//! let answer = generate_object(&client, &request, |v| v.get("answer")?.as_bool()).await?;
//! println!("{:?}", answer);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod registry;
pub mod structured;

// Re-export main types
pub use client::{
    LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage, ObjectStream,
};
pub use factory::create_client;
pub use providers::{OllamaClient, Reply, ScriptedClient};
pub use registry::{roles, ModelBinding, ModelRegistry};
pub use structured::{generate_object, parse_partial_object};
