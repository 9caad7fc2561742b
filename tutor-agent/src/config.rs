//! Configuration for the tutor pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::backend::gemini::GEMINI_BASE_URL;
use crate::backend::{GeminiBackend, LlmBackend, LlmError, MockBackend, OpenAiBackend};
use crate::prompt::DEFAULT_GRADE_BAND;
use crate::tiers::DEFAULT_FAST_TIMEOUT_MS;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Error types for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Config file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config parsed but is not usable
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Backend could not be constructed
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),
}

/// Hosted model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    /// Canned replies, for offline runs
    Mock,
}

impl ModelProvider {
    fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ModelProvider::Gemini => Some(GEMINI_BASE_URL),
            ModelProvider::OpenAi => Some(OPENAI_BASE_URL),
            ModelProvider::Mock => None,
        }
    }

    fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            ModelProvider::Gemini => Some("GEMINI_API_KEY"),
            ModelProvider::OpenAi => Some("OPENAI_API_KEY"),
            ModelProvider::Mock => None,
        }
    }
}

/// One hosted model tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider
    pub provider: ModelProvider,
    /// Model name
    pub model: String,
    /// API root (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Wait budget (ms); only the fast tier uses it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Reply used by the mock provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<String>,
}

impl ModelConfig {
    /// Create a model config with provider defaults.
    pub fn new(provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            api_key_env: None,
            timeout_ms: None,
            max_tokens: None,
            temperature: None,
            mock_response: None,
        }
    }

    /// Default fast tier: Gemini Flash with a 5 s budget.
    pub fn default_fast() -> Self {
        Self {
            timeout_ms: Some(DEFAULT_FAST_TIMEOUT_MS),
            max_tokens: Some(400),
            temperature: Some(0.4),
            ..Self::new(ModelProvider::Gemini, "gemini-2.0-flash")
        }
    }

    /// Default fallback tier: OpenAI, no budget.
    pub fn default_fallback() -> Self {
        Self {
            max_tokens: Some(400),
            temperature: Some(0.4),
            ..Self::new(ModelProvider::OpenAi, "gpt-4o-mini")
        }
    }

    /// Effective wait budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_FAST_TIMEOUT_MS))
    }

    /// Name of the environment variable holding the API key.
    pub fn api_key_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.provider.default_api_key_env())
    }

    /// Read the API key from the environment.
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env()?;
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }

    /// Construct the backend this config describes.
    ///
    /// A missing API key is not an error here; the backend fails its calls
    /// and the tier soft-fails.
    pub fn build_backend(&self) -> Result<Arc<dyn LlmBackend>, ConfigError> {
        let base_url = self
            .base_url
            .clone()
            .or_else(|| self.provider.default_base_url().map(String::from));
        let api_key = self.api_key();

        if api_key.is_none() {
            if let Some(var) = self.api_key_env() {
                warn!(model = %self.model, env = %var, "API key not set; tier will be skipped");
            }
        }

        let backend: Arc<dyn LlmBackend> = match self.provider {
            ModelProvider::Gemini => Arc::new(GeminiBackend::new(
                base_url.unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
                &self.model,
                api_key,
            )?),
            ModelProvider::OpenAi => Arc::new(OpenAiBackend::new(
                base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                &self.model,
                api_key,
            )?),
            ModelProvider::Mock => {
                let mut mock = MockBackend::new(&self.model);
                if let Some(reply) = &self.mock_response {
                    mock = mock.with_response(reply);
                }
                Arc::new(mock)
            }
        };

        Ok(backend)
    }

    fn validate(&self, tier: &str) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{tier}: model is empty")));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(format!("{tier}: timeout_ms must be positive")));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Invalid(format!(
                    "{tier}: temperature {temperature} outside 0.0-2.0"
                )));
            }
        }
        Ok(())
    }
}

/// Where escalation incidents go. The log always receives them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    /// Append incidents to this JSONL file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonl_path: Option<PathBuf>,
    /// POST incidents to this URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Audit log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record resolutions
    pub enabled: bool,
    /// Entries kept before pruning
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}

/// Configuration for the tutor pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Agent ID for logs
    pub agent_id: String,
    /// Fast tier model
    pub fast_model: ModelConfig,
    /// Fallback tier model
    pub fallback_model: ModelConfig,
    /// Guard rules file (embedded defaults when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_rules_path: Option<PathBuf>,
    /// Knowledge tables file (embedded defaults when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_path: Option<PathBuf>,
    /// Grade band named in the system instruction
    pub grade_band: String,
    /// Incident destinations
    pub incidents: IncidentConfig,
    /// Audit log
    pub audit: AuditConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            fast_model: ModelConfig::default_fast(),
            fallback_model: ModelConfig::default_fallback(),
            guard_rules_path: None,
            knowledge_path: None,
            grade_band: DEFAULT_GRADE_BAND.to_string(),
            incidents: IncidentConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new config with agent ID.
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    /// Parse config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fast_model.validate("fast_model")?;
        self.fallback_model.validate("fallback_model")?;
        if self.audit.enabled && self.audit.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "audit.max_entries must be positive when audit is enabled".to_string(),
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
        let config = PipelineConfig::default();
        assert_eq!(config.fast_model.provider, ModelProvider::Gemini);
        assert_eq!(config.fast_model.timeout(), Duration::from_secs(5));
        assert_eq!(config.fallback_model.provider, ModelProvider::OpenAi);
        assert_eq!(config.fallback_model.api_key_env(), Some("OPENAI_API_KEY"));
        assert_eq!(config.grade_band, "K-12");
        assert!(config.audit.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = PipelineConfig::new("tutor-test");
        let yaml = config.to_yaml().unwrap();
        let parsed = PipelineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
agent_id: campus
fallback_model:
  provider: mock
  model: offline
  mock_response: "Ask your teacher"
incidents:
  jsonl_path: /var/lib/tutor/incidents.jsonl
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.agent_id, "campus");
        assert_eq!(config.fast_model, ModelConfig::default_fast());
        assert_eq!(config.fallback_model.provider, ModelProvider::Mock);
        assert!(config.fallback_model.api_key_env().is_none());
        assert!(config.incidents.webhook_url.is_none());
        assert_eq!(config.audit.max_entries, 10_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_timeout = "fast_model: {provider: gemini, model: flash, timeout_ms: 0}";
        assert!(matches!(
            PipelineConfig::from_yaml(zero_timeout),
            Err(ConfigError::Invalid(_))
        ));

        let hot = "fallback_model: {provider: openai, model: gpt, temperature: 3.5}";
        assert!(PipelineConfig::from_yaml(hot).is_err());

        assert!(matches!(
            PipelineConfig::from_yaml("fast_model: {provider: claude, model: x}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_backend_from_config() {
        let mut model = ModelConfig::new(ModelProvider::Mock, "offline");
        model.mock_response = Some("Canned".to_string());

        let backend = model.build_backend().unwrap();
        assert_eq!(backend.id(), "offline");
        let reply = backend
            .complete(crate::backend::CompletionRequest::user("hi"))
            .await
            .unwrap();
        assert_eq!(reply.content, "Canned");
    }

    #[test]
    fn test_api_key_from_named_env() {
        let mut model = ModelConfig::new(ModelProvider::OpenAi, "gpt-4o-mini");
        model.api_key_env = Some("TUTOR_AGENT_CONFIG_TEST_KEY".to_string());
        assert!(model.api_key().is_none());

        std::env::set_var("TUTOR_AGENT_CONFIG_TEST_KEY", "sk-test");
        assert_eq!(model.api_key().as_deref(), Some("sk-test"));
        std::env::remove_var("TUTOR_AGENT_CONFIG_TEST_KEY");
    }
}
