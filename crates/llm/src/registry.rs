//! Model-role registry.
//!
//! Components ask for a logical role ("quality-model", "tag-model", ...)
//! rather than a concrete provider. The registry is built once at start-up
//! and handed to each component explicitly.

use hivemind_core::{AppConfig, AppResult};
use std::collections::HashMap;
use std::sync::Arc;

use crate::client::{LlmClient, LlmRequest};
use crate::factory::create_client;

/// Logical model roles.
pub mod roles {
    pub const CHAT: &str = "chat-model";
    pub const TITLE: &str = "title-model";
    pub const TAG: &str = "tag-model";
    pub const AGREEMENT: &str = "expert-agreement-model";
    pub const SYNTHESIS: &str = "expert-consensus-synthesis-model";
    pub const QUALITY: &str = "quality-model";

    /// Every role the expert core resolves.
    pub const ALL: [&str; 6] = [CHAT, TITLE, TAG, AGREEMENT, SYNTHESIS, QUALITY];
}

/// A provider client paired with the model it should be asked for.
#[derive(Clone)]
pub struct ModelBinding {
    pub client: Arc<dyn LlmClient>,
    pub model: String,
}

impl ModelBinding {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Start a request against this binding's model.
    pub fn request(&self, prompt: impl Into<String>) -> LlmRequest {
        LlmRequest::new(prompt, self.model.clone())
    }
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .finish()
    }
}

/// Role name to model binding, with a default for unmapped roles.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    default: ModelBinding,
    bindings: HashMap<String, ModelBinding>,
}

impl ModelRegistry {
    /// Registry where every role resolves to `default`.
    pub fn new(default: ModelBinding) -> Self {
        Self {
            default,
            bindings: HashMap::new(),
        }
    }

    /// Bind a role to a specific client and model.
    pub fn bind(mut self, role: impl Into<String>, binding: ModelBinding) -> Self {
        self.bindings.insert(role.into(), binding);
        self
    }

    /// Resolve a role, falling back to the default binding.
    pub fn resolve(&self, role: &str) -> &ModelBinding {
        self.bindings.get(role).unwrap_or(&self.default)
    }

    /// Whether a role has its own binding.
    pub fn is_bound(&self, role: &str) -> bool {
        self.bindings.contains_key(role)
    }

    /// Build the registry from configuration.
    ///
    /// The top-level provider/model become the default binding; each entry
    /// of `experts.models` overrides one role.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let endpoint = config.provider_endpoint(&config.provider);
        let api_key = config.resolve_api_key(&config.provider);
        let client = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())?;

        let mut registry = Self::new(ModelBinding::new(client, config.model.clone()));

        for (role, role_config) in &config.experts.models {
            let endpoint = role_config
                .endpoint
                .clone()
                .or_else(|| config.provider_endpoint(&role_config.provider));
            let api_key = config.resolve_api_key(&role_config.provider);
            let client = create_client(
                &role_config.provider,
                endpoint.as_deref(),
                api_key.as_deref(),
            )?;

            tracing::debug!(
                role = %role,
                provider = %role_config.provider,
                model = %role_config.model,
                "Bound model role"
            );
            registry = registry.bind(role.clone(), ModelBinding::new(client, role_config.model.clone()));
        }

        Ok(registry)
    }
}
