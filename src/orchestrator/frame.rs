//! Frame decoration: time/weather chrome around framed text.

use crate::display::{encode_row, Layout, COLS, ROWS, TEXT_ROWS};
use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Framed board plus any non-fatal problems met while decorating.
#[derive(Debug, Clone, PartialEq)]
pub struct FramedLayout {
    pub layout: Layout,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait FrameDecorator: Send + Sync {
    /// Place validated text (at most 5 rows) on the board and add chrome.
    async fn decorate(
        &self,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<FramedLayout, PipelineError>;
}

/// Short current-conditions text for the frame row, e.g. `72F SUNNY`.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self) -> Result<String, String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// strftime pattern for the time shown in row 6
    #[serde(default = "default_time_format")]
    pub time_format: String,
    /// Center text rows horizontally
    #[serde(default = "default_center")]
    pub center: bool,
}

fn default_time_format() -> String {
    "%a %-I:%M %p".to_string()
}

fn default_center() -> bool {
    true
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
            center: default_center(),
        }
    }
}

/// Default decorator: text in rows 1-5, local time and optional weather in row 6.
pub struct ClockFrame {
    config: FrameConfig,
    weather: Option<Arc<dyn WeatherSource>>,
}

impl Default for ClockFrame {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}

impl ClockFrame {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            weather: None,
        }
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherSource>) -> Self {
        self.weather = Some(weather);
        self
    }

    fn place(&self, codes: Vec<u8>) -> Vec<u8> {
        if !self.config.center || codes.len() >= COLS {
            return codes;
        }
        let pad = (COLS - codes.len()) / 2;
        let mut row = vec![0u8; pad];
        row.extend(codes);
        row
    }

    /// Time on the left, weather on the right; weather is dropped when both don't fit.
    fn status_row(&self, time: &str, weather: Option<&str>, warnings: &mut Vec<String>) -> String {
        let time = time.trim().to_uppercase();
        let Some(weather) = weather.map(|w| w.trim().to_uppercase()).filter(|w| !w.is_empty())
        else {
            return time;
        };
        let used = time.chars().count() + weather.chars().count();
        if used + 1 > COLS {
            warnings.push(format!("Weather text '{}' does not fit beside the time", weather));
            return time;
        }
        let gap = COLS - used;
        format!("{}{}{}", time, " ".repeat(gap), weather)
    }
}

#[async_trait]
impl FrameDecorator for ClockFrame {
    async fn decorate(
        &self,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<FramedLayout, PipelineError> {
        let mut warnings = Vec::new();
        let lines: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            text.split('\n').collect()
        };
        if lines.len() > TEXT_ROWS {
            return Err(PipelineError::Frame(format!(
                "{} text rows do not fit above the frame row",
                lines.len()
            )));
        }

        let mut layout = Layout::blank();
        for (index, line) in lines.iter().enumerate() {
            let codes = encode_row(line).map_err(|e| PipelineError::Frame(e.to_string()))?;
            layout.set_row(index, &self.place(codes));
        }

        let weather = match &self.weather {
            Some(source) => match source.current().await {
                Ok(text) => Some(text),
                Err(e) => {
                    warnings.push(format!("Weather unavailable: {}", e));
                    None
                }
            },
            None => None,
        };

        let time = timestamp
            .with_timezone(&Local)
            .format(&self.config.time_format)
            .to_string();
        let status = self.status_row(&time, weather.as_deref(), &mut warnings);
        let status_codes = match encode_row(&status) {
            Ok(codes) => codes,
            Err(e) => {
                warnings.push(format!("Frame row not displayable: {}", e));
                encode_row(&time.to_uppercase()).unwrap_or_default()
            }
        };
        if status_codes.len() > COLS {
            warnings.push(format!("Frame row truncated to {} tiles", COLS));
        }
        layout.set_row(ROWS - 1, &status_codes[..status_codes.len().min(COLS)]);

        debug!(rows = lines.len(), warnings = warnings.len(), "Frame applied");
        Ok(FramedLayout { layout, warnings })
    }
}
