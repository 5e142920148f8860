//! Configuration system for the PHIL backend
//!
//! Configuration lives in a TOML file. Secrets never appear in the file itself:
//! the file names the environment variables that hold them, and those are
//! resolved at runtime.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhilConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    pub supabase: Option<SupabaseSection>,
    pub llm: LlmSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub chat: ChatSection,
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Interface to bind the API server to
    #[serde(default = "default_host")]
    pub host: String,
    /// API port (default: 5000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Port for the health/metrics server (default: 8080)
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            health_port: default_health_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_health_port() -> u16 {
    8080
}

/// Authentication section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSection {
    /// When false every request runs as a local developer account
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Supabase project section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupabaseSection {
    /// Project URL, e.g. https://abc.supabase.co
    pub url: String,
    /// Environment variable containing the service role key
    #[serde(default = "default_service_key_env")]
    pub service_key_env: String,
}

fn default_service_key_env() -> String {
    "SUPABASE_KEY".to_string()
}

/// LLM section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name; only "perplexity" is supported
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the provider endpoint
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 120)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub models: ModelSection,
}

fn default_provider() -> String {
    "perplexity".to_string()
}

fn default_api_key_env() -> String {
    "PERPLEXITY_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Model used for each kind of LLM call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSection {
    #[serde(default = "default_generation_model")]
    pub generation: String,
    #[serde(default = "default_review_model")]
    pub review: String,
    #[serde(default = "default_generation_model")]
    pub chat: String,
    #[serde(default = "default_review_model")]
    pub recommendations: String,
    #[serde(default = "default_personality_model")]
    pub personality: String,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            generation: default_generation_model(),
            review: default_review_model(),
            chat: default_generation_model(),
            recommendations: default_review_model(),
            personality: default_personality_model(),
        }
    }
}

fn default_generation_model() -> String {
    "sonar-reasoning-pro".to_string()
}

fn default_review_model() -> String {
    "sonar-pro".to_string()
}

fn default_personality_model() -> String {
    "sonar".to_string()
}

/// Storage section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Where users and agents are persisted
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Supabase,
    Memory,
}

/// Chat behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSection {
    /// Restyle chat answers through the personality prompt
    #[serde(default)]
    pub personality: bool,
    /// Number of context URLs kept for a chat turn (default: 10)
    #[serde(default = "default_max_context_urls")]
    pub max_context_urls: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            personality: false,
            max_context_urls: default_max_context_urls(),
        }
    }
}

fn default_max_context_urls() -> usize {
    10
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PhilConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PhilConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-section consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be non-zero".to_string(),
            ));
        }

        if self.llm.provider != "perplexity" {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider: {}",
                self.llm.provider
            )));
        }

        if self.chat.max_context_urls == 0 || self.chat.max_context_urls > 50 {
            return Err(ConfigError::InvalidConfig(
                "chat.max_context_urls must be between 1 and 50".to_string(),
            ));
        }

        for origin in &self.server.cors_origins {
            validate_cors_origin(origin)?;
        }

        let needs_supabase =
            self.auth.enabled || self.storage.backend == StorageBackend::Supabase;
        match &self.supabase {
            None if needs_supabase => Err(ConfigError::InvalidConfig(
                "[supabase] section is required when auth is enabled or storage.backend = \"supabase\""
                    .to_string(),
            )),
            Some(supabase) => validate_supabase_url(&supabase.url),
            None => Ok(()),
        }
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Get Supabase service key from environment variable
    pub fn get_supabase_key(&self) -> Result<String, ConfigError> {
        let supabase = self.supabase.as_ref().ok_or_else(|| {
            ConfigError::InvalidConfig("[supabase] section is missing".to_string())
        })?;
        Self::get_env_var_required(&supabase.service_key_env)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[auth]
enabled = false

[llm]
api_key_env = "PERPLEXITY_API_KEY"

[storage]
backend = "memory"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_supabase_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::InvalidConfig(format!("supabase.url '{raw}' is invalid: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidConfig(format!(
            "supabase.url '{raw}' must use http or https"
        )));
    }

    Ok(())
}

/// CORS origins are a bare scheme://host[:port]
fn validate_cors_origin(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::InvalidConfig(format!("server.cors_origins entry '{raw}' {reason}"))
    };
    let parsed = url::Url::parse(raw).map_err(|_| invalid("is not a URL"))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid("must be an http(s) origin"));
    }
    if raw.trim_end_matches('/') != parsed.origin().ascii_serialization() {
        return Err(invalid("must not contain a path or query"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[server]
host = "127.0.0.1"
port = 5050
cors_origins = ["http://localhost:5173"]
health_port = 9090

[auth]
enabled = true

[supabase]
url = "https://demo.supabase.co"
service_key_env = "SB_KEY"

[llm]
provider = "perplexity"
api_key_env = "PPLX_KEY"
timeout_secs = 30

[llm.models]
generation = "sonar-reasoning"
chat = "sonar"

[storage]
backend = "supabase"

[chat]
personality = true
max_context_urls = 5
"#;

        let config = PhilConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.server.health_port, 9090);
        assert_eq!(config.supabase.as_ref().unwrap().service_key_env, "SB_KEY");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.llm.models.generation, "sonar-reasoning");
        assert_eq!(config.llm.models.chat, "sonar");
        assert_eq!(config.llm.models.review, "sonar-pro");
        assert!(config.chat.personality);
        assert_eq!(config.chat.max_context_urls, 5);
    }

    #[test]
    fn test_minimal_memory_config_uses_defaults() {
        let config = PhilConfig::test_config();
        config.validate().unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.health_port, 8080);
        assert_eq!(config.llm.provider, "perplexity");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.llm.models.personality, "sonar");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(!config.chat.personality);
        assert_eq!(config.chat.max_context_urls, 10);
    }

    #[test]
    fn test_auth_requires_supabase_section() {
        let toml_content = r#"
[llm]

[storage]
backend = "memory"
"#;
        let result = PhilConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let toml_content = r#"
[auth]
enabled = false

[llm]
provider = "openai"

[storage]
backend = "memory"
"#;
        let err = PhilConfig::from_toml_str(toml_content).unwrap_err();
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn test_supabase_url_must_be_http() {
        assert!(validate_supabase_url("https://x.supabase.co").is_ok());
        assert!(validate_supabase_url("http://localhost:54321").is_ok());
        assert!(validate_supabase_url("ftp://x.supabase.co").is_err());
        assert!(validate_supabase_url("not a url").is_err());
    }

    #[test]
    fn test_context_url_limit_bounds() {
        let mut config = PhilConfig::test_config();
        config.chat.max_context_urls = 0;
        assert!(config.validate().is_err());
        config.chat.max_context_urls = 51;
        assert!(config.validate().is_err());
        config.chat.max_context_urls = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_env_var_reported_by_name() {
        let mut config = PhilConfig::test_config();
        config.llm.api_key_env = "PHIL_TEST_DEFINITELY_UNSET_KEY".to_string();
        match config.get_llm_api_key() {
            Err(ConfigError::EnvVarNotFound(name)) => {
                assert_eq!(name, "PHIL_TEST_DEFINITELY_UNSET_KEY")
            }
            other => panic!("Expected EnvVarNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_cors_origins_must_be_origins() {
        assert!(validate_cors_origin("http://localhost:5173").is_ok());
        assert!(validate_cors_origin("https://phil.example.com").is_ok());
        assert!(validate_cors_origin("https://phil.example.com/app").is_err());
        assert!(validate_cors_origin("localhost:5173").is_err());

        let mut config = PhilConfig::test_config();
        config.server.cors_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }
}
