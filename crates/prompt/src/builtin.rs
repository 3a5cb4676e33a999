//! Built-in prompt definitions compiled into the binary.

use crate::loader::parse_prompt;
use crate::types::PromptDefinition;
use hivemind_core::{AppError, AppResult};

pub const AGREEMENT: &str = "experts.agreement";
pub const SYNTHESIS: &str = "experts.synthesis";
pub const QUALITY: &str = "experts.quality";
pub const TITLE: &str = "experts.title";
pub const TAGS: &str = "experts.tags";
pub const ASK: &str = "ask.default";

const BUILTINS: &[(&str, &str)] = &[
    (AGREEMENT, include_str!("../prompts/experts.agreement.yml")),
    (SYNTHESIS, include_str!("../prompts/experts.synthesis.yml")),
    (QUALITY, include_str!("../prompts/experts.quality.yml")),
    (TITLE, include_str!("../prompts/experts.title.yml")),
    (TAGS, include_str!("../prompts/experts.tags.yml")),
    (ASK, include_str!("../prompts/ask.default.yml")),
];

/// IDs of every built-in prompt.
pub fn builtin_ids() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(id, _)| *id)
}

/// Parse a built-in prompt by ID.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTINS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, &format!("builtin:{}", prompt_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_parses_with_matching_id() {
        for id in builtin_ids() {
            let def = builtin_prompt(id).unwrap();
            assert_eq!(def.id, id);
        }
    }

    #[test]
    fn test_structured_prompts_declare_json() {
        for id in [AGREEMENT, SYNTHESIS, QUALITY, TAGS] {
            assert!(builtin_prompt(id).unwrap().output.is_json(), "{}", id);
        }
        assert!(!builtin_prompt(TITLE).unwrap().output.is_json());
    }

    #[test]
    fn test_only_ask_injects_expert_context() {
        for id in builtin_ids() {
            let def = builtin_prompt(id).unwrap();
            assert_eq!(def.context.include_expert_context, id == ASK, "{}", id);
        }
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin_prompt("nope").is_err());
    }
}
