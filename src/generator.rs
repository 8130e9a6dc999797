//! Generators
//!
//! A generator turns a [`GenerationContext`] into one [`GeneratedContent`]. Generators are
//! built per attempt by a [`GeneratorFactory`] bound to a specific provider; families of
//! generators are expressed through composition (data tables, decorators) rather than
//! subtyping.

pub mod fallback;
pub mod notification;
pub mod prompt;
pub mod registry;
pub mod selector;
pub mod tools;

use crate::content::GeneratedContent;
use crate::error::ProviderError;
use crate::provider::{AiProvider, ModelTier, ToolSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub use fallback::{StaticFallback, StaticFallbackFactory};
pub use notification::{
    NotificationEntry, NotificationFormatter, NotificationTable, TemplateFormatter,
};
pub use prompt::PromptGeneratorFactory;
pub use registry::{GeneratorRegistry, RegisteredGenerator};
pub use selector::{GeneratorSelector, SelectionRequest};
pub use tools::WithTools;

/// Inbound event that may select a notification generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TriggerEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Per-cycle input handed to a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub timestamp: DateTime<Utc>,
    pub trigger: Option<TriggerEvent>,
    pub tools: Vec<ToolSpec>,
    pub model_tier: ModelTier,
}

impl GenerationContext {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            trigger: None,
            tools: Vec::new(),
            model_tier: ModelTier::default(),
        }
    }

    pub fn with_trigger(mut self, trigger: Option<TriggerEvent>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_model_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }
}

/// Ordered priority class; lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Notification,
    Normal,
    Fallback,
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PriorityTier::Notification => "NOTIFICATION",
            PriorityTier::Normal => "NORMAL",
            PriorityTier::Fallback => "FALLBACK",
        };
        write!(f, "{}", label)
    }
}

/// Regex matched against inbound event-type strings.
#[derive(Clone)]
pub struct TriggerPattern(Regex);

impl TriggerPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self(Regex::new(pattern)?))
    }

    pub fn matches(&self, event_type: &str) -> bool {
        self.0.is_match(event_type)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for TriggerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TriggerPattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for TriggerPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Immutable catalog entry describing one generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRegistration {
    pub id: String,
    pub name: String,
    pub priority_tier: PriorityTier,
    pub model_tier: ModelTier,
    /// Whether the frame decorator adds time/weather chrome to this generator's text
    pub apply_frame: bool,
    pub event_trigger_pattern: Option<TriggerPattern>,
    pub tags: BTreeSet<String>,
}

impl GeneratorRegistration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        priority_tier: PriorityTier,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority_tier,
            model_tier: ModelTier::default(),
            apply_frame: true,
            event_trigger_pattern: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_model_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    pub fn with_apply_frame(mut self, apply_frame: bool) -> Self {
        self.apply_frame = apply_frame;
        self
    }

    pub fn with_trigger_pattern(mut self, pattern: TriggerPattern) -> Self {
        self.event_trigger_pattern = Some(pattern);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// True when this is a notification registration whose pattern accepts `event_type`.
    pub fn matches_event(&self, event_type: &str) -> bool {
        self.priority_tier == PriorityTier::Notification
            && self
                .event_trigger_pattern
                .as_ref()
                .is_some_and(|pattern| pattern.matches(event_type))
    }
}

/// Produces one message for one cycle.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &GenerationContext)
        -> Result<GeneratedContent, ProviderError>;
}

/// Builds a fresh generator bound to a provider.
pub trait GeneratorFactory: Send + Sync {
    fn build(&self, provider: Arc<dyn AiProvider>) -> Box<dyn Generator>;

    /// A generator that never calls a provider. When present the orchestrator runs it
    /// directly instead of through retry/failover.
    fn build_standalone(&self) -> Option<Box<dyn Generator>> {
        None
    }
}
