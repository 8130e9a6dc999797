//! Notification generators as a data table of `{pattern, formatter}` rows.

use crate::content::GeneratedContent;
use crate::error::{PipelineError, ProviderError};
use crate::generator::registry::GeneratorRegistry;
use crate::generator::{
    GenerationContext, Generator, GeneratorFactory, GeneratorRegistration, PriorityTier,
    TriggerEvent, TriggerPattern,
};
use crate::provider::AiProvider;
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(type|payload(?:\.[A-Za-z0-9_\-]+)*)\}").expect("placeholder pattern is valid")
});

/// Renders an event into message text.
pub trait NotificationFormatter: Send + Sync {
    fn format(&self, event: &TriggerEvent) -> String;
}

impl<F> NotificationFormatter for F
where
    F: Fn(&TriggerEvent) -> String + Send + Sync,
{
    fn format(&self, event: &TriggerEvent) -> String {
        self(event)
    }
}

/// Template with `{type}` and `{payload.path.to.field}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFormatter {
    template: String,
}

impl TemplateFormatter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(payload, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl NotificationFormatter for TemplateFormatter {
    fn format(&self, event: &TriggerEvent) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| {
                let key = &caps[1];
                if key == "type" {
                    return event.event_type.clone();
                }
                let path = key.strip_prefix("payload").unwrap_or_default();
                lookup(&event.payload, path)
                    .map(display_value)
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// One table row.
#[derive(Clone)]
pub struct NotificationEntry {
    pub id: String,
    pub name: String,
    pub pattern: TriggerPattern,
    pub formatter: Arc<dyn NotificationFormatter>,
    pub apply_frame: bool,
}

impl NotificationEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pattern: TriggerPattern,
        formatter: Arc<dyn NotificationFormatter>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pattern,
            formatter,
            apply_frame: true,
        }
    }
}

/// Ordered table of notification rows; order is the match tie-break.
#[derive(Clone, Default)]
pub struct NotificationTable {
    entries: Vec<NotificationEntry>,
}

impl NotificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: NotificationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[NotificationEntry] {
        &self.entries
    }

    pub fn match_event(&self, event_type: &str) -> Option<&NotificationEntry> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.matches(event_type))
    }

    /// Register every row as a NOTIFICATION-tier generator, in table order.
    pub fn register_into(&self, registry: &mut GeneratorRegistry) -> Result<(), PipelineError> {
        for entry in &self.entries {
            let registration =
                GeneratorRegistration::new(&entry.id, &entry.name, PriorityTier::Notification)
                    .with_trigger_pattern(entry.pattern.clone())
                    .with_apply_frame(entry.apply_frame)
                    .with_tag("notification");
            registry.register(
                registration,
                Arc::new(NotificationFactory {
                    formatter: Arc::clone(&entry.formatter),
                }),
            )?;
        }
        Ok(())
    }
}

struct NotificationFactory {
    formatter: Arc<dyn NotificationFormatter>,
}

struct NotificationGenerator {
    formatter: Arc<dyn NotificationFormatter>,
}

#[async_trait]
impl Generator for NotificationGenerator {
    async fn generate(
        &self,
        context: &GenerationContext,
    ) -> Result<GeneratedContent, ProviderError> {
        let event = context.trigger.as_ref().ok_or_else(|| {
            ProviderError::InvalidRequest(
                "notification generator needs a trigger event".to_string(),
            )
        })?;
        Ok(GeneratedContent::text(self.formatter.format(event))
            .with_extra("event_type", Value::String(event.event_type.clone())))
    }
}

impl GeneratorFactory for NotificationFactory {
    fn build(&self, _provider: Arc<dyn AiProvider>) -> Box<dyn Generator> {
        Box::new(NotificationGenerator {
            formatter: Arc::clone(&self.formatter),
        })
    }

    fn build_standalone(&self) -> Option<Box<dyn Generator>> {
        Some(Box::new(NotificationGenerator {
            formatter: Arc::clone(&self.formatter),
        }))
    }
}
