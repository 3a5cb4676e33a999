//! LLM provider factory.
//!
//! Maps a provider name from configuration to a client implementation.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, ScriptedClient};
use hivemind_core::{AppError, AppResult};
use std::sync::Arc;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "scripted")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key, sent as a bearer token when present
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            let mut client = OllamaClient::with_base_url(base_url);
            if let Some(key) = api_key {
                client = client.with_api_key(key);
            }
            Ok(Arc::new(client))
        }
        // Offline runs: an empty script, so every call fails and callers
        // take their documented fallbacks.
        "scripted" => Ok(Arc::new(ScriptedClient::new())),
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
