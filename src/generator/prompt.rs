//! Prompt-driven generator: configured prompt text sent through the bound provider.

use crate::content::{GeneratedContent, OutputMode};
use crate::error::ProviderError;
use crate::generator::{GenerationContext, Generator, GeneratorFactory};
use crate::provider::{AiProvider, GenerationRequest};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tracing::debug;

/// Substitute `{date}`, `{time}` and `{weekday}` from the cycle timestamp (local time).
pub fn render_prompt(template: &str, timestamp: DateTime<Utc>) -> String {
    let local = timestamp.with_timezone(&Local);
    template
        .replace("{date}", &local.format("%Y-%m-%d").to_string())
        .replace("{time}", &local.format("%H:%M").to_string())
        .replace("{weekday}", &local.format("%A").to_string())
}

/// Turn a layout-mode response into rows or an integer grid.
///
/// A JSON array of integer arrays is taken as glyph codes; anything else is split into
/// character rows.
fn parse_layout(text: &str) -> GeneratedContent {
    if let Ok(grid) = serde_json::from_str::<Vec<Vec<i64>>>(text.trim()) {
        return GeneratedContent::layout_codes(grid);
    }
    let rows = text
        .trim_matches('\n')
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    GeneratedContent::layout_rows(rows)
}

pub struct PromptGenerator {
    provider: Arc<dyn AiProvider>,
    system_prompt: String,
    user_prompt: String,
    output_mode: OutputMode,
    max_tokens: Option<u32>,
}

#[async_trait]
impl Generator for PromptGenerator {
    async fn generate(
        &self,
        context: &GenerationContext,
    ) -> Result<GeneratedContent, ProviderError> {
        let request = GenerationRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: render_prompt(&self.user_prompt, context.timestamp),
            tools: context.tools.clone(),
            model_tier: context.model_tier,
            max_tokens: self.max_tokens,
        };
        debug!(provider = %self.provider.name(), "Requesting generation");
        let response = self.provider.generate(request).await?;

        let content = match self.output_mode {
            OutputMode::Text => GeneratedContent::text(response.text.trim()),
            OutputMode::Layout => parse_layout(&response.text),
        };
        let mut content =
            content.with_provider(self.provider.name(), response.model, response.tokens_used);
        if !response.tool_calls.is_empty() {
            content = content.with_extra(
                "tool_calls",
                serde_json::to_value(&response.tool_calls).unwrap_or_default(),
            );
        }
        Ok(content)
    }
}

#[derive(Debug, Clone)]
pub struct PromptGeneratorFactory {
    pub system_prompt: String,
    pub user_prompt: String,
    pub output_mode: OutputMode,
    pub max_tokens: Option<u32>,
}

impl PromptGeneratorFactory {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            output_mode: OutputMode::Text,
            max_tokens: None,
        }
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl GeneratorFactory for PromptGeneratorFactory {
    fn build(&self, provider: Arc<dyn AiProvider>) -> Box<dyn Generator> {
        Box::new(PromptGenerator {
            provider,
            system_prompt: self.system_prompt.clone(),
            user_prompt: self.user_prompt.clone(),
            output_mode: self.output_mode,
            max_tokens: self.max_tokens,
        })
    }
}
