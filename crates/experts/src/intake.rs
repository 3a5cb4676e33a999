//! Title and tag generation for new requests.

use crate::prompts::render_request;
use crate::tags::{all_tags, extract_expertise_tags, filter_to_vocabulary};
use hivemind_core::AppResult;
use hivemind_llm::ModelBinding;
use hivemind_prompt::PromptDefinition;
use serde_json::json;

pub const UNTITLED: &str = "Untitled";
const MAX_TITLE_CHARS: usize = 80;

/// Clean a generated title: first line, unquoted, at most 80 characters.
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string())
}

/// Pull the first JSON array of strings out of a model reply.
pub fn parse_tag_array(raw: &str) -> Option<Vec<String>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&raw[start..=end]).ok()
}

#[derive(Debug, Clone)]
pub struct RequestIntake {
    title_model: ModelBinding,
    tag_model: ModelBinding,
    title_prompt: PromptDefinition,
    tags_prompt: PromptDefinition,
}

impl RequestIntake {
    pub fn new(
        title_model: ModelBinding,
        tag_model: ModelBinding,
        title_prompt: PromptDefinition,
        tags_prompt: PromptDefinition,
    ) -> Self {
        Self {
            title_model,
            tag_model,
            title_prompt,
            tags_prompt,
        }
    }

    /// Short title for a question; `"Untitled"` when generation fails.
    pub async fn generate_title(&self, question: &str) -> String {
        match self.try_generate_title(question).await {
            Ok(Some(title)) => title,
            Ok(None) => UNTITLED.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Title generation failed");
                UNTITLED.to_string()
            }
        }
    }

    async fn try_generate_title(&self, question: &str) -> AppResult<Option<String>> {
        let request = render_request(
            &self.title_model,
            &self.title_prompt,
            json!({ "question": question }),
            None,
        )?;
        let response = self.title_model.client.complete(&request).await?;
        Ok(clean_title(&response.content))
    }

    /// Expertise tags for a question, restricted to the vocabulary.
    ///
    /// Falls back to substring extraction when the model fails or returns
    /// nothing usable.
    pub async fn extract_tags(&self, question: &str) -> Vec<String> {
        match self.try_extract_tags(question).await {
            Ok(tags) if !tags.is_empty() => tags,
            Ok(_) => extract_expertise_tags(question),
            Err(e) => {
                tracing::warn!(error = %e, "Tag generation failed, extracting from text");
                extract_expertise_tags(question)
            }
        }
    }

    async fn try_extract_tags(&self, question: &str) -> AppResult<Vec<String>> {
        let vocabulary: Vec<&str> = all_tags().collect();
        let request = render_request(
            &self.tag_model,
            &self.tags_prompt,
            json!({ "question": question, "vocabulary": vocabulary }),
            None,
        )?;
        let response = self.tag_model.client.complete(&request).await?;

        let tags = parse_tag_array(&response.content).unwrap_or_default();
        Ok(filter_to_vocabulary(&tags))
    }
}
