//! Delivery of encoded layouts to the physical board.

use crate::display::Layout;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const LOCAL_API_KEY_HEADER: &str = "X-Vestaboard-Local-Api-Key";
const LOCAL_API_PATH: &str = "/local-api/message";
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, layout: &Layout) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Log layouts instead of sending them
    #[default]
    DryRun,
    /// Board's local HTTP API
    LocalApi,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub mode: DeliveryMode,
    /// Board base URL, e.g. `http://vestaboard.local:7000`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl DeliveryConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.is_empty()).or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.is_empty())
        })
    }
}

/// POSTs the 6x22 code grid to the board's local API.
pub struct LocalApiDelivery {
    client: Client,
    url: String,
    api_key: String,
}

impl LocalApiDelivery {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), LOCAL_API_PATH),
            api_key,
        })
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self, PipelineError> {
        let url = config.url.as_deref().ok_or_else(|| {
            PipelineError::Config("delivery.url is required for local_api".to_string())
        })?;
        let api_key = config.resolve_api_key().ok_or_else(|| {
            PipelineError::Config("delivery API key is required for local_api".to_string())
        })?;
        Self::new(url, api_key)
    }
}

#[async_trait]
impl DeliveryClient for LocalApiDelivery {
    async fn send(&self, layout: &Layout) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .header(LOCAL_API_KEY_HEADER, &self.api_key)
            .json(layout)
            .send()
            .await
            .map_err(|e| PipelineError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Delivery(format!("status {}: {}", status, body)));
        }
        debug!(url = %self.url, "Layout delivered");
        Ok(())
    }
}

/// Logs the rendered board instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDelivery;

#[async_trait]
impl DeliveryClient for DryRunDelivery {
    async fn send(&self, layout: &Layout) -> Result<(), PipelineError> {
        info!(layout = %layout, "Dry run: layout not sent");
        Ok(())
    }
}

/// Build the configured delivery client.
pub fn create_delivery(
    config: &DeliveryConfig,
) -> Result<std::sync::Arc<dyn DeliveryClient>, PipelineError> {
    Ok(match config.mode {
        DeliveryMode::DryRun => std::sync::Arc::new(DryRunDelivery),
        DeliveryMode::LocalApi => std::sync::Arc::new(LocalApiDelivery::from_config(config)?),
    })
}
