//! Configuration management for Hivemind.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.hivemind/config.yaml)
//!
//! The configuration is workspace-centric, with the store and prompt
//! overrides living in `.hivemind/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .hivemind/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Default LLM provider for roles without an explicit binding
    pub provider: String,

    /// Default model identifier
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Log line format
    #[serde(skip)]
    pub log_format: LogFormat,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Expert routing, consensus and corpus settings
    pub experts: ExpertsConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: Option<String>,

    pub model: String,

    #[serde(rename = "apiKeyEnv")]
    pub api_key_env: Option<String>,
}

/// Settings for the expert-routing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertsConfig {
    /// SQLite database path, relative to the workspace unless absolute
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Logical model role -> provider binding
    #[serde(default)]
    pub models: HashMap<String, ModelRoleConfig>,
}

/// Expert matching thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum cosine similarity for semantic assignment
    #[serde(rename = "similarityThreshold", default = "default_similarity")]
    pub similarity_threshold: f32,

    /// Cap on generic-fallback assignments; `None` assigns the whole pool
    #[serde(rename = "maxFallbackExperts", default)]
    pub max_fallback_experts: Option<usize>,
}

/// Quality gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Overall score (0-100) an answer needs to pass
    #[serde(rename = "passThreshold", default = "default_pass_threshold")]
    pub pass_threshold: u32,

    /// Questions shorter than this skip the provider and auto-pass
    #[serde(rename = "minQuestionChars", default = "default_min_question_chars")]
    pub min_question_chars: usize,

    /// Re-run the assessment server-side before accepting a submission
    #[serde(rename = "recheckOnSubmit", default)]
    pub recheck_on_submit: bool,
}

/// Retrieval settings for the accepted-answer corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_rag_limit")]
    pub limit: usize,

    #[serde(rename = "similarityThreshold", default = "default_similarity")]
    pub similarity_threshold: f32,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "mock" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Optional provider endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Binding of a logical model role to a provider and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoleConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_database() -> PathBuf {
    PathBuf::from(".hivemind/hivemind.db")
}

fn default_similarity() -> f32 {
    0.7
}

fn default_pass_threshold() -> u32 {
    70
}

fn default_min_question_chars() -> usize {
    100
}

fn default_rag_limit() -> usize {
    3
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity(),
            max_fallback_experts: None,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            min_question_chars: default_min_question_chars(),
            recheck_on_submit: false,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            limit: default_rag_limit(),
            similarity_threshold: default_similarity(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl Default for ExpertsConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            matching: MatchingConfig::default(),
            quality: QualityConfig::default(),
            rag: RagConfig::default(),
            embedding: EmbeddingConfig::default(),
            models: HashMap::new(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    experts: Option<ExpertsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_format: LogFormat::Pretty,
            llm: None,
            experts: ExpertsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `HIVEMIND_WORKSPACE`: Override workspace path
    /// - `HIVEMIND_CONFIG`: Path to config file
    /// - `HIVEMIND_PROVIDER`: Default LLM provider
    /// - `HIVEMIND_MODEL`: Default model identifier
    /// - `HIVEMIND_API_KEY`: API key
    /// - `HIVEMIND_DATABASE`: SQLite database path
    /// - `HIVEMIND_LOG_FORMAT`: `pretty` or `json`
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use hivemind_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Database: {:?}", config.database_path());
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("HIVEMIND_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("HIVEMIND_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".hivemind/config.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("HIVEMIND_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("HIVEMIND_MODEL") {
            config.model = model;
        }

        if let Ok(database) = std::env::var("HIVEMIND_DATABASE") {
            config.experts.database = PathBuf::from(database);
        }

        config.api_key = std::env::var("HIVEMIND_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok().or(config.log_level);

        if let Ok(format) = std::env::var("HIVEMIND_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(format) = logging.format {
                result.log_format = LogFormat::parse(&format);
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model.clone();
            }

            result.llm = Some(llm);
        }

        if let Some(experts) = config_file.experts {
            result.experts = experts;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and YAML.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .hivemind directory.
    pub fn hivemind_dir(&self) -> PathBuf {
        self.workspace.join(".hivemind")
    }

    /// Ensure the .hivemind directory exists.
    pub fn ensure_hivemind_dir(&self) -> AppResult<()> {
        let dir = self.hivemind_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .hivemind directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved path of the SQLite store.
    pub fn database_path(&self) -> PathBuf {
        if self.experts.database.is_absolute() {
            self.experts.database.clone()
        } else {
            self.workspace.join(&self.experts.database)
        }
    }

    /// Get a provider's connection settings.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Resolve the endpoint configured for a provider, if any.
    pub fn provider_endpoint(&self, provider: &str) -> Option<String> {
        self.get_provider_config(provider)
            .and_then(|pc| pc.endpoint.clone())
    }

    /// Resolve API key from environment variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        self.get_provider_config(provider)
            .and_then(|pc| pc.api_key_env.as_ref())
            .and_then(|env_var| std::env::var(env_var).ok())
    }

    /// Validate configuration for the active provider and thresholds.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "scripted"];

        let mut providers: Vec<&str> = vec![self.provider.as_str()];
        providers.extend(self.experts.models.values().map(|m| m.provider.as_str()));

        for provider in providers {
            if !known_providers.contains(&provider) {
                return Err(AppError::Config(format!(
                    "Unknown provider: {}. Supported: {}",
                    provider,
                    known_providers.join(", ")
                )));
            }
        }

        let thresholds = [
            ("matching.similarityThreshold", self.experts.matching.similarity_threshold),
            ("rag.similarityThreshold", self.experts.rag.similarity_threshold),
        ];
        for (name, value) in thresholds {
            if !(-1.0..=1.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }

        if self.experts.quality.pass_threshold > 100 {
            return Err(AppError::Config(format!(
                "quality.passThreshold must be within [0, 100], got {}",
                self.experts.quality.pass_threshold
            )));
        }

        if self.experts.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(!config.verbose);
        assert!(!config.no_color);
        assert_eq!(config.experts.matching.similarity_threshold, 0.7);
        assert_eq!(config.experts.matching.max_fallback_experts, None);
        assert_eq!(config.experts.quality.pass_threshold, 70);
        assert_eq!(config.experts.quality.min_question_chars, 100);
        assert!(!config.experts.quality.recheck_on_submit);
        assert_eq!(config.experts.rag.limit, 3);
    }

    #[test]
    fn test_hivemind_dir() {
        let config = AppConfig::default();
        assert!(config.hivemind_dir().ends_with(".hivemind"));
    }

    #[test]
    fn test_database_path_relative_to_workspace() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/tmp/ws");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/ws/.hivemind/hivemind.db")
        );

        config.experts.database = PathBuf::from("/var/lib/hivemind.db");
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/hivemind.db"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("scripted".to_string()),
            Some("echo".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "scripted");
        assert_eq!(overridden.model, "echo");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_experts_section() {
        let yaml = r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: "http://localhost:11434"
      model: nemotron
logging:
  format: json
experts:
  matching:
    similarityThreshold: 0.8
    maxFallbackExperts: 25
  quality:
    passThreshold: 60
  models:
    expert-consensus-synthesis-model:
      provider: ollama
      model: llama3.1:70b
"#;
        let merged = AppConfig::default().merge_yaml_str(yaml).unwrap();
        assert_eq!(merged.model, "nemotron");
        assert_eq!(merged.log_format, LogFormat::Json);
        assert_eq!(merged.experts.matching.similarity_threshold, 0.8);
        assert_eq!(merged.experts.matching.max_fallback_experts, Some(25));
        assert_eq!(merged.experts.quality.pass_threshold, 60);
        // Unspecified fields keep their defaults
        assert_eq!(merged.experts.quality.min_question_chars, 100);
        assert_eq!(merged.experts.rag.similarity_threshold, 0.7);
        assert_eq!(
            merged.experts.models["expert-consensus-synthesis-model"].model,
            "llama3.1:70b"
        );
        assert_eq!(
            merged.provider_endpoint("ollama").as_deref(),
            Some("http://localhost:11434")
        );
    }

    #[test]
    fn test_provider_settings_cover_connection_only() {
        let provider = ProviderConfig {
            endpoint: Some("http://localhost:11434".to_string()),
            model: "nemotron".to_string(),
            api_key_env: None,
        };
        let value = serde_json::to_value(&provider).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["apiKeyEnv", "endpoint", "model"]);
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_role_provider() {
        let mut config = AppConfig::default();
        config.experts.models.insert(
            "quality-model".to_string(),
            ModelRoleConfig {
                provider: "nope".to_string(),
                model: "x".to_string(),
                endpoint: None,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_thresholds() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.experts.rag.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        config.experts.rag.similarity_threshold = 0.7;
        config.experts.quality.pass_threshold = 101;
        assert!(config.validate().is_err());
    }
}
