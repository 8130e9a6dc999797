//! Generated content model shared by generators, the retry engine and the orchestrator.

use crate::display::ValidationResult;
use crate::retry::FailoverMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physical layout mode of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Up to 5 lines of 21 characters; the frame decorator owns row 6
    Text,
    /// Full 6x22 board art with no frame region
    Layout,
}

/// Full-board payload, either characters (pre-encoding) or glyph codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayoutPayload {
    Codes(Vec<Vec<i64>>),
    Rows(Vec<String>),
}

/// Observability metadata attached to each generated message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<FailoverMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    /// Generator-specific extras (event type, tool calls, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One generated message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub output_mode: OutputMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutPayload>,
    #[serde(default)]
    pub metadata: ContentMetadata,
}

impl GeneratedContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            output_mode: OutputMode::Text,
            text: Some(text.into()),
            layout: None,
            metadata: ContentMetadata::default(),
        }
    }

    pub fn layout_rows(rows: Vec<String>) -> Self {
        Self {
            output_mode: OutputMode::Layout,
            text: None,
            layout: Some(LayoutPayload::Rows(rows)),
            metadata: ContentMetadata::default(),
        }
    }

    pub fn layout_codes(grid: Vec<Vec<i64>>) -> Self {
        Self {
            output_mode: OutputMode::Layout,
            text: None,
            layout: Some(LayoutPayload::Codes(grid)),
            metadata: ContentMetadata::default(),
        }
    }

    /// Record which provider and model produced this content.
    pub fn with_provider(
        mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        tokens_used: u32,
    ) -> Self {
        self.metadata.provider = Some(provider.into());
        self.metadata.model = Some(model.into());
        self.metadata.tokens_used = Some(tokens_used);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    pub fn is_text(&self) -> bool {
        self.output_mode == OutputMode::Text
    }
}
