//! Prompt definitions used by the expert core, resolved once at start-up.

use hivemind_core::AppResult;
use hivemind_llm::{LlmRequest, ModelBinding};
use hivemind_prompt::builtin::{self, builtin_prompt};
use hivemind_prompt::{build_prompt, resolve_prompt, PromptDefinition};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PromptSet {
    pub agreement: PromptDefinition,
    pub synthesis: PromptDefinition,
    pub quality: PromptDefinition,
    pub title: PromptDefinition,
    pub tags: PromptDefinition,
    pub ask: PromptDefinition,
}

impl PromptSet {
    /// Built-in definitions only.
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            agreement: builtin_prompt(builtin::AGREEMENT)?,
            synthesis: builtin_prompt(builtin::SYNTHESIS)?,
            quality: builtin_prompt(builtin::QUALITY)?,
            title: builtin_prompt(builtin::TITLE)?,
            tags: builtin_prompt(builtin::TAGS)?,
            ask: builtin_prompt(builtin::ASK)?,
        })
    }

    /// Built-ins with `.hivemind/prompts/` overrides from the workspace.
    pub fn resolve(workspace: &Path) -> AppResult<Self> {
        Ok(Self {
            agreement: resolve_prompt(workspace, builtin::AGREEMENT)?,
            synthesis: resolve_prompt(workspace, builtin::SYNTHESIS)?,
            quality: resolve_prompt(workspace, builtin::QUALITY)?,
            title: resolve_prompt(workspace, builtin::TITLE)?,
            tags: resolve_prompt(workspace, builtin::TAGS)?,
            ask: resolve_prompt(workspace, builtin::ASK)?,
        })
    }
}

/// Render `definition` and address it to `binding`'s model.
///
/// JSON-output prompts get the provider's JSON mode.
pub(crate) fn render_request(
    binding: &ModelBinding,
    definition: &PromptDefinition,
    variables: Value,
    expert_context: Option<String>,
) -> AppResult<LlmRequest> {
    let built = build_prompt(definition, variables, expert_context)?;
    let mut request = binding.request(built.user);
    if let Some(system) = built.system {
        request = request.with_system(system);
    }
    if definition.output.is_json() {
        request = request.with_json_format();
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_set() {
        let set = PromptSet::builtin().unwrap();
        assert_eq!(set.agreement.id, builtin::AGREEMENT);
        assert_eq!(set.ask.id, builtin::ASK);
    }

    #[test]
    fn test_resolve_picks_up_override() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".hivemind/prompts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("experts.title.yml"),
            "id: experts.title\ntitle: Short titles\napiVersion: \"1.0\"\ntemplate: \"{{question}}\"\noutput:\n  format: text\n",
        )
        .unwrap();

        let set = PromptSet::resolve(temp.path()).unwrap();
        assert_eq!(set.title.title, "Short titles");
        assert_eq!(set.quality.id, builtin::QUALITY);
    }
}
