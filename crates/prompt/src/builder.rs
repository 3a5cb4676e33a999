//! Prompt builder for rendering templates and injecting context.

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
use hivemind_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::{Map, Value};

/// Build a prompt from a definition and input variables.
///
/// Renders the system and user templates with Handlebars (no HTML escaping).
/// When the definition enables expert context and `expert_context` is
/// non-empty, it is exposed to both templates as `expertContext`.
///
/// # Errors
/// Returns `AppError::Prompt` if a declared input variable is missing or a
/// template fails to render.
///
/// # Example
/// ```no_run
/// use hivemind_prompt::{build_prompt, resolve_prompt};
/// use serde_json::json;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = resolve_prompt(Path::new("."), "ask.default")?;
/// let built = build_prompt(&def, json!({"question": "What is Rust?"}), None)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: Value,
    expert_context: Option<String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let mut variables = match variables {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(AppError::Prompt(format!(
                "Prompt variables must be an object, got {}",
                other
            )))
        }
    };

    for name in &definition.input.variables {
        if !variables.contains_key(name) {
            return Err(AppError::Prompt(format!(
                "Prompt {} requires variable '{}'",
                definition.id, name
            )));
        }
    }

    let expert_context_included = definition.context.include_expert_context
        && expert_context.as_deref().is_some_and(|c| !c.trim().is_empty());
    if expert_context_included {
        if let Some(context) = expert_context {
            variables.insert("expertContext".to_string(), Value::String(context));
            tracing::debug!("Injected expert context");
        }
    }

    let variables = Value::Object(variables);
    let handlebars = renderer();

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(&handlebars, template, &variables))
        .transpose()?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let user = render_template(&handlebars, &definition.template, &variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            expert_context_included,
            output_format: definition.output.format.clone(),
        },
    })
}

fn renderer() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

fn render_template(handlebars: &Handlebars<'_>, template: &str, variables: &Value) -> AppResult<String> {
    handlebars
        .render_template(template, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::types::{PromptBehavior, PromptContextConfig, PromptInputSpec, PromptOutputSpec};
    use serde_json::json;

    fn definition(include_expert_context: bool) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            behavior: PromptBehavior::default(),
            context: PromptContextConfig {
                include_expert_context,
            },
            input: PromptInputSpec {
                variables: vec!["question".to_string()],
            },
            system: Some("System{{#if expertContext}}\n{{expertContext}}{{/if}}".to_string()),
            template: "Question: {{question}}".to_string(),
            output: PromptOutputSpec {
                format: "markdown".to_string(),
            },
        }
    }

    #[test]
    fn test_build_without_context() {
        let built = build_prompt(&definition(false), json!({"question": "Why <Rust>?"}), None).unwrap();
        assert_eq!(built.user, "Question: Why <Rust>?");
        assert_eq!(built.system.as_deref(), Some("System"));
        assert!(!built.metadata.expert_context_included);
    }

    #[test]
    fn test_build_with_expert_context() {
        let built = build_prompt(
            &definition(true),
            json!({"question": "q"}),
            Some("[EXPERT CONTEXT]\nQuestion: a\nAnswer: b\n[/EXPERT CONTEXT]".to_string()),
        )
        .unwrap();
        assert!(built.metadata.expert_context_included);
        assert!(built.system.unwrap().contains("[EXPERT CONTEXT]"));
    }

    #[test]
    fn test_context_ignored_when_disabled_or_blank() {
        let built = build_prompt(&definition(false), json!({"question": "q"}), Some("ctx".into())).unwrap();
        assert!(!built.metadata.expert_context_included);
        assert_eq!(built.system.as_deref(), Some("System"));

        let built = build_prompt(&definition(true), json!({"question": "q"}), Some("  ".into())).unwrap();
        assert!(!built.metadata.expert_context_included);
    }

    #[test]
    fn test_missing_variable_rejected() {
        let err = build_prompt(&definition(false), json!({}), None).unwrap_err();
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_non_object_variables_rejected() {
        assert!(build_prompt(&definition(false), json!(["q"]), None).is_err());
    }

    #[test]
    fn test_agreement_prompt_numbers_responses() {
        let def = builtin::builtin_prompt(builtin::AGREEMENT).unwrap();
        let built = build_prompt(
            &def,
            json!({
                "question": "Which optimizer?",
                "responses": [
                    {"number": 1, "text": "Adam"},
                    {"number": 2, "text": "AdamW"}
                ]
            }),
            None,
        )
        .unwrap();

        assert!(built.user.contains("Expert Response 1:\nAdam"));
        assert!(built.user.contains("Expert Response 2:\nAdamW"));
        assert!(built.user.contains("User Question: Which optimizer?"));
    }

    #[test]
    fn test_tags_prompt_lists_vocabulary() {
        let def = builtin::builtin_prompt(builtin::TAGS).unwrap();
        let built = build_prompt(
            &def,
            json!({"question": "q", "vocabulary": ["Rust", "Go"]}),
            None,
        )
        .unwrap();
        assert!(built.system.unwrap().contains("Rust, Go"));
    }
}
