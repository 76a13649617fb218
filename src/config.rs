//! Runtime configuration: the handful of knobs this crate itself owns
//! (TTL, retry policy, buffer cap overrides, per-provider base URLs).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::canonical::{OpenAiVariant, ProviderTag};
use crate::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Runtime configuration for the service factory and its adapters.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub service_ttl: Duration,
    pub retry_policy: RetryPolicy,
    pub request_timeout: Duration,
    pub http_pool_max_idle_per_host: usize,
    pub openai_base_url: String,
    pub groq_base_url: String,
    pub cerebras_base_url: String,
    pub fireworks_base_url: String,
    pub anthropic_base_url: String,
    pub gemini_base_url: String,
    pub ollama_base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            service_ttl: Duration::from_secs(3600),
            retry_policy: RetryPolicy::default(),
            request_timeout: Duration::from_secs(180),
            http_pool_max_idle_per_host: 16,
            openai_base_url: "https://api.openai.com/v1".into(),
            groq_base_url: "https://api.groq.com/openai/v1".into(),
            cerebras_base_url: "https://api.cerebras.ai/v1".into(),
            fireworks_base_url: "https://api.fireworks.ai/inference/v1".into(),
            anthropic_base_url: "https://api.anthropic.com/v1".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            ollama_base_url: "http://localhost:11434".into(),
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn base_url_for(&self, provider: ProviderTag) -> String {
        match provider {
            ProviderTag::OpenAiFamily(OpenAiVariant::OpenAi) => self.openai_base_url.clone(),
            ProviderTag::OpenAiFamily(OpenAiVariant::Groq) => self.groq_base_url.clone(),
            ProviderTag::OpenAiFamily(OpenAiVariant::Cerebras) => self.cerebras_base_url.clone(),
            ProviderTag::OpenAiFamily(OpenAiVariant::Fireworks) => self.fireworks_base_url.clone(),
            ProviderTag::Anthropic => self.anthropic_base_url.clone(),
            ProviderTag::Gemini => self.gemini_base_url.clone(),
            ProviderTag::Ollama => self.ollama_base_url.clone(),
            ProviderTag::Empty => String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_ttl.is_zero() {
            return Err(ConfigError::Validation("service_ttl must be non-zero".into()));
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry_policy.max_attempts must be at least 1".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "request_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn load_yaml(text: &str) -> Result<Self, ConfigError> {
        let wire: RuntimeConfigWire = serde_yaml::from_str(text)?;
        let config = Self::from(wire);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct RuntimeConfigWire {
    #[serde(default = "default_service_ttl_secs")]
    service_ttl_secs: u64,
    #[serde(default = "default_max_attempts")]
    retry_max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    retry_base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    retry_max_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_pool_size")]
    http_pool_max_idle_per_host: usize,
    #[serde(default)]
    openai_base_url: Option<String>,
    #[serde(default)]
    groq_base_url: Option<String>,
    #[serde(default)]
    cerebras_base_url: Option<String>,
    #[serde(default)]
    fireworks_base_url: Option<String>,
    #[serde(default)]
    anthropic_base_url: Option<String>,
    #[serde(default)]
    gemini_base_url: Option<String>,
    #[serde(default)]
    ollama_base_url: Option<String>,
}

fn default_service_ttl_secs() -> u64 {
    3600
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    180
}
fn default_pool_size() -> usize {
    16
}

impl From<RuntimeConfigWire> for RuntimeConfig {
    fn from(wire: RuntimeConfigWire) -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            service_ttl: Duration::from_secs(wire.service_ttl_secs),
            retry_policy: RetryPolicy {
                max_attempts: wire.retry_max_attempts,
                base_delay: Duration::from_millis(wire.retry_base_delay_ms),
                max_delay: Duration::from_millis(wire.retry_max_delay_ms),
            },
            request_timeout: Duration::from_secs(wire.request_timeout_secs),
            http_pool_max_idle_per_host: wire.http_pool_max_idle_per_host,
            openai_base_url: wire.openai_base_url.unwrap_or(defaults.openai_base_url),
            groq_base_url: wire.groq_base_url.unwrap_or(defaults.groq_base_url),
            cerebras_base_url: wire.cerebras_base_url.unwrap_or(defaults.cerebras_base_url),
            fireworks_base_url: wire.fireworks_base_url.unwrap_or(defaults.fireworks_base_url),
            anthropic_base_url: wire.anthropic_base_url.unwrap_or(defaults.anthropic_base_url),
            gemini_base_url: wire.gemini_base_url.unwrap_or(defaults.gemini_base_url),
            ollama_base_url: wire.ollama_base_url.unwrap_or(defaults.ollama_base_url),
        }
    }
}
