//! Prompt system for Hivemind.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions
//! - Built-in prompts for agreement, synthesis, quality, title and tag generation
//! - Workspace overrides in `.hivemind/prompts/`
//! - Handlebars template rendering
//! - Expert context injection for AI answers

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{available_prompts, list_prompts, load_prompt, resolve_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptContextConfig, PromptDefinition,
    PromptInputSpec, PromptOutputSpec,
};
