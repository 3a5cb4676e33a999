//! LLM client abstraction and request/response types.
//!
//! Besides plain completion and text streaming, every client can stream
//! structured JSON objects. The default `stream_object` asks the provider
//! for JSON output, accumulates the text stream and yields each new
//! partially-complete object as soon as the buffer can be repaired into
//! valid JSON.

use futures::{Stream, StreamExt};
use hivemind_core::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::structured::parse_partial_object;

/// LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt text to send to the LLM
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2")
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Enable streaming responses
    #[serde(default)]
    pub stream: bool,

    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Output format hint ("json" for structured objects)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LlmRequest {
    /// Create a new LLM request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            stream: false,
            system: None,
            format: None,
        }
    }

    /// Enable streaming for this request.
    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Ask the provider for JSON output.
    pub fn with_json_format(mut self) -> Self {
        self.format = Some("json".to_string());
        self
    }
}

/// LLM completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,

    /// Whether the response was complete
    #[serde(default = "default_true")]
    pub done: bool,
}

fn default_true() -> bool {
    true
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,

    #[serde(default)]
    pub completion_tokens: u32,

    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A chunk from a streaming LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStreamChunk {
    /// Incremental text content
    pub content: String,

    /// Model generating the stream
    pub model: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage statistics (only in final chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<LlmUsage>,
}

/// Stream of LLM chunks.
pub type LlmStream = Pin<Box<dyn Stream<Item = AppResult<LlmStreamChunk>> + Send>>;

/// Stream of successively more complete JSON objects.
pub type ObjectStream = Pin<Box<dyn Stream<Item = AppResult<Value>> + Send>>;

/// Trait for LLM providers.
///
/// Abstracts the underlying provider (Ollama, scripted test doubles) behind
/// one interface for completion, text streaming and structured output.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Get the provider name (e.g., "ollama").
    fn provider_name(&self) -> &str;

    /// Perform a non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Perform a streaming completion.
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream>;

    /// Stream partial JSON objects for the request.
    ///
    /// Each item is the best-effort parse of everything received so far.
    /// Items are only emitted when the parsed value changes, and the last
    /// item is the most complete object the provider produced.
    async fn stream_object(&self, request: &LlmRequest) -> AppResult<ObjectStream> {
        let request = request.clone().with_json_format().with_streaming();
        let chunks = self.stream(&request).await?;

        let objects = chunks
            .scan(
                (String::new(), None::<Value>),
                |(buffer, last), chunk| {
                    let item = match chunk {
                        Ok(chunk) => {
                            buffer.push_str(&chunk.content);
                            match parse_partial_object(buffer) {
                                Some(value) if last.as_ref() != Some(&value) => {
                                    *last = Some(value.clone());
                                    Some(Ok(value))
                                }
                                _ => None,
                            }
                        }
                        Err(e) => Some(Err(e)),
                    };
                    futures::future::ready(Some(item))
                },
            )
            .filter_map(futures::future::ready);

        Ok(Box::pin(objects))
    }
}
