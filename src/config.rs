//! Configuration System
//!
//! Layered board configuration: built-in defaults, the user's global file, workspace files
//! and `TILEBOARD__SECTION__KEY` environment overrides. `BoardConfig::validate` collects
//! every problem instead of stopping at the first.

use crate::circuit::CircuitConfig;
use crate::content::OutputMode;
use crate::generator::{PriorityTier, TriggerPattern};
use crate::logging::LoggingConfig;
use crate::orchestrator::{DeliveryConfig, FrameConfig};
use crate::provider::{ModelTier, ToolSpec};
use crate::retry::RetryConfig;
use crate::scheduler::ScheduleConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Provider definitions keyed by name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub circuit: CircuitConfig,

    #[serde(default)]
    pub frame: FrameConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub generators: Vec<GeneratorConfig>,

    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which configured providers fill the preferred and alternate slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_preferred")]
    pub preferred: String,
    #[serde(default = "default_alternate")]
    pub alternate: String,
}

fn default_preferred() -> String {
    "openai".to_string()
}

fn default_alternate() -> String {
    "anthropic".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            preferred: default_preferred(),
            alternate: default_alternate(),
        }
    }
}

/// Storage paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory, relative to the workspace root unless absolute
    #[serde(default = "default_state_path")]
    pub path: PathBuf,

    /// Keep a log of major-cycle attempts
    #[serde(default = "default_true")]
    pub record_attempts: bool,
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".tileboard/state")
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            record_attempts: true,
        }
    }
}

/// A prompt-driven generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_priority_tier")]
    pub priority_tier: PriorityTier,

    /// Regex over trigger event types (notification tier)
    #[serde(default)]
    pub event_trigger_pattern: Option<String>,

    #[serde(default)]
    pub model_tier: ModelTier,

    #[serde(default = "default_true")]
    pub apply_frame: bool,

    #[serde(default = "default_output_mode")]
    pub output_mode: OutputMode,

    #[serde(default)]
    pub system_prompt: String,

    pub user_prompt: String,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub tools: Vec<ToolSpec>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_priority_tier() -> PriorityTier {
    PriorityTier::Normal
}

fn default_output_mode() -> OutputMode {
    OutputMode::Text
}

/// One row of the notification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Regex over trigger event types
    pub pattern: String,

    /// Template with `{type}` and `{payload.path}` placeholders
    pub template: String,

    #[serde(default = "default_true")]
    pub apply_frame: bool,
}

/// Last-resort messages used when every provider path fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_id")]
    pub id: String,

    #[serde(default = "default_fallback_messages")]
    pub messages: Vec<String>,

    #[serde(default = "default_true")]
    pub apply_frame: bool,
}

fn default_fallback_id() -> String {
    "static_fallback".to_string()
}

fn default_fallback_messages() -> Vec<String> {
    vec![
        "GOOD THINGS TAKE TIME".to_string(),
        "STAY CURIOUS".to_string(),
        "MAKE TODAY COUNT".to_string(),
    ]
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            id: default_fallback_id(),
            messages: default_fallback_messages(),
            apply_frame: true,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("Provider '{0}': {1}")]
    Provider(String, String),

    #[error("Routing: {0}")]
    Routing(String),

    #[error("Retry: {0}")]
    Retry(String),

    #[error("Circuit: {0}")]
    Circuit(String),

    #[error("Generator '{0}': {1}")]
    Generator(String, String),

    #[error("Notification '{0}': {1}")]
    Notification(String, String),

    #[error("Fallback: {0}")]
    Fallback(String),
}

impl BoardConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        for (name, provider) in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(ConfigValidationError::Provider(name.clone(), e));
            }
        }

        self.validate_routing(&mut errors);

        if self.retry.attempts_per_provider == 0 {
            errors.push(ConfigValidationError::Retry(
                "attempts_per_provider must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            errors.push(ConfigValidationError::Retry(format!(
                "backoff_multiplier must be >= 1.0 (got {})",
                self.retry.backoff_multiplier
            )));
        }
        if self.circuit.failure_threshold == 0 {
            errors.push(ConfigValidationError::Circuit(
                "failure_threshold must be at least 1".to_string(),
            ));
        }

        self.validate_generators(&mut errors);

        if self.fallback.messages.iter().all(|m| m.trim().is_empty()) {
            errors.push(ConfigValidationError::Fallback(
                "at least one non-empty message is required".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_routing(&self, errors: &mut Vec<ConfigValidationError>) {
        let routing = &self.routing;
        for (slot, name) in [("preferred", &routing.preferred), ("alternate", &routing.alternate)] {
            if !self.providers.contains_key(name) {
                errors.push(ConfigValidationError::Routing(format!(
                    "{} provider '{}' is not defined under [providers]",
                    slot, name
                )));
            }
        }
        if routing.preferred == routing.alternate {
            errors.push(ConfigValidationError::Routing(format!(
                "preferred and alternate must differ (both '{}')",
                routing.preferred
            )));
        }
    }

    fn validate_generators(&self, errors: &mut Vec<ConfigValidationError>) {
        let mut ids = HashSet::new();
        ids.insert(self.fallback.id.as_str());

        for generator in &self.generators {
            if !ids.insert(generator.id.as_str()) {
                errors.push(ConfigValidationError::Generator(
                    generator.id.clone(),
                    "duplicate generator id".to_string(),
                ));
            }
            if generator.priority_tier == PriorityTier::Fallback {
                errors.push(ConfigValidationError::Generator(
                    generator.id.clone(),
                    "the fallback tier is reserved for [fallback]".to_string(),
                ));
            }
            if let Some(pattern) = &generator.event_trigger_pattern {
                if let Err(e) = TriggerPattern::new(pattern) {
                    errors.push(ConfigValidationError::Generator(
                        generator.id.clone(),
                        format!("invalid event_trigger_pattern: {}", e),
                    ));
                }
            } else if generator.priority_tier == PriorityTier::Notification {
                errors.push(ConfigValidationError::Generator(
                    generator.id.clone(),
                    "notification generators need an event_trigger_pattern".to_string(),
                ));
            }
            if generator.user_prompt.trim().is_empty() {
                errors.push(ConfigValidationError::Generator(
                    generator.id.clone(),
                    "user_prompt cannot be empty".to_string(),
                ));
            }
        }

        for notification in &self.notifications {
            if !ids.insert(notification.id.as_str()) {
                errors.push(ConfigValidationError::Notification(
                    notification.id.clone(),
                    "duplicate generator id".to_string(),
                ));
            }
            if notification.pattern.is_empty() {
                errors.push(ConfigValidationError::Notification(
                    notification.id.clone(),
                    "pattern cannot be empty".to_string(),
                ));
            } else if let Err(e) = TriggerPattern::new(&notification.pattern) {
                errors.push(ConfigValidationError::Notification(
                    notification.id.clone(),
                    format!("invalid pattern: {}", e),
                ));
            }
        }
    }
}
