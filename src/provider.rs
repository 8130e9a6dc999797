//! AI Provider Abstraction
//!
//! The opaque `generate(request) -> text` capability that generators call. Concrete
//! HTTP clients live in [`clients`]; everything upstream of this module sees only the
//! [`AiProvider`] trait and classified [`ProviderError`]s.

use crate::error::{PipelineError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod clients;

pub use clients::{AnthropicClient, OpenAiClient};

/// Advisory model size a generator asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Light,
    #[default]
    Medium,
    Heavy,
}

/// Tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool arguments
    pub parameters: serde_json::Value,
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub model_tier: ModelTier,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub tokens_used: u32,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}

/// Text-generation backend
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name; also the source of its circuit id
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest)
        -> Result<GenerationResponse, ProviderError>;

    async fn validate_connection(&self) -> ConnectionCheck;
}

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[serde(alias = "openai")]
    OpenAI,
    Anthropic,
    /// Local Ollama server via its OpenAI-compatible endpoint
    Ollama,
}

/// Concrete model names per advisory tier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierModels {
    pub light: Option<String>,
    pub medium: Option<String>,
    pub heavy: Option<String>,
}

/// Provider configuration entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,

    /// Default model when no tier-specific model is configured
    pub model: String,

    #[serde(default)]
    pub models: TierModels,

    /// Inline API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Base URL override
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    400
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider_type,
            model: model.into(),
            models: TierModels::default(),
            api_key: None,
            api_key_env: None,
            endpoint: None,
            max_tokens: default_max_tokens(),
        }
    }

    /// Model name for an advisory tier, falling back to `model`.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        let specific = match tier {
            ModelTier::Light => self.models.light.as_deref(),
            ModelTier::Medium => self.models.medium.as_deref(),
            ModelTier::Heavy => self.models.heavy.as_deref(),
        };
        specific.unwrap_or(&self.model)
    }

    /// Inline key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid endpoint URL: {}", endpoint));
            }
        }
        if self.provider_type != ProviderType::Ollama
            && self.api_key.is_none()
            && self.api_key_env.is_none()
        {
            return Err("api_key or api_key_env is required".to_string());
        }
        Ok(())
    }
}

pub(crate) fn map_http_error(error: reqwest::Error) -> ProviderError {
    if let Some(status) = error.status() {
        ProviderError::from_status(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        ProviderError::RequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ProviderError::RequestFailed(format!("Connection error: {}", error))
    } else {
        ProviderError::Other(format!("HTTP error: {}", error))
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub(crate) fn build_provider_http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Builds provider clients from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn AiProvider>, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(format!("Provider '{}': {}", name, e)))?;

        match config.provider_type {
            ProviderType::OpenAI => {
                let api_key = config.resolve_api_key().ok_or_else(|| {
                    PipelineError::Config(format!("Provider '{}': API key not set", name))
                })?;
                Ok(Arc::new(OpenAiClient::new(
                    name,
                    config.clone(),
                    Some(api_key),
                    config
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                )?))
            }
            ProviderType::Ollama => Ok(Arc::new(OpenAiClient::new(
                name,
                config.clone(),
                config.resolve_api_key(),
                config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            )?)),
            ProviderType::Anthropic => {
                let api_key = config.resolve_api_key().ok_or_else(|| {
                    PipelineError::Config(format!("Provider '{}': API key not set", name))
                })?;
                Ok(Arc::new(AnthropicClient::new(name, config.clone(), api_key)?))
            }
        }
    }
}
