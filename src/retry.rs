//! Retry / Failover Engine
//!
//! Runs one generator against a preferred/alternate provider pair with a bounded number of
//! attempts, exponential backoff between executed attempts, and circuit-breaker gating.
//! The generator is rebuilt for every attempt through a [`GeneratorFactory`] so no state
//! leaks from one provider to the other.

pub mod plan;

use crate::circuit::{provider_circuit_id, CircuitBreaker};
use crate::content::GeneratedContent;
use crate::error::{FailedAttempt, PipelineError};
use crate::generator::{GenerationContext, GeneratorFactory};
use crate::provider::AiProvider;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use plan::{AttemptPlan, AttemptSlot, ProviderSlot};

const MAX_REDACTED_LEN: usize = 200;

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sk-[A-Za-z0-9_\-]{8,}",
        r"(?i)(api[_-]?key|x-api-key|authorization|bearer|token)(\s*[:=]\s*|\s+)[^\s,;]+",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts_per_provider")]
    pub attempts_per_provider: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_attempts_per_provider() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_per_provider: default_attempts_per_provider(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn total_attempts(&self) -> u32 {
        self.attempts_per_provider * 2
    }

    /// Wait before the `executed`-th executed attempt (1-based); the first never waits.
    pub fn backoff_before(&self, executed: u32) -> Duration {
        if executed < 2 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi((executed - 2) as i32);
        Duration::from_millis((self.backoff_base_ms as f64 * factor).round() as u64)
    }
}

/// Backoff sleep, swappable so tests can record delays instead of waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Prior failure as exposed in metadata, with secrets masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedFailure {
    pub provider: String,
    pub attempt: u32,
    pub error: String,
}

impl From<&FailedAttempt> for RedactedFailure {
    fn from(failure: &FailedAttempt) -> Self {
        Self {
            provider: failure.provider.clone(),
            attempt: failure.attempt,
            error: redact_error(&failure.error.to_string()),
        }
    }
}

/// Record of how a result was reached, or of every attempt when none succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverMetadata {
    /// Attempts actually executed, including the successful one
    pub total_attempts: u32,
    pub attempts_by_provider: BTreeMap<String, u32>,
    pub failover_occurred: bool,
    pub final_provider: String,
    pub failures: Vec<RedactedFailure>,
    pub total_duration_ms: u64,
    /// A provider was skipped because its circuit was open
    pub circuit_tripped: bool,
}

impl FailoverMetadata {
    /// Summary of a run in which every executed attempt failed. `final_provider` is the
    /// provider of the last attempt; skipped circuits are not visible here. None when
    /// nothing ran.
    pub fn from_failed_attempts(
        attempts: &[FailedAttempt],
        total_duration_ms: u64,
    ) -> Option<Self> {
        let last = attempts.last()?;
        let mut attempts_by_provider = BTreeMap::new();
        for failure in attempts {
            *attempts_by_provider
                .entry(failure.provider.clone())
                .or_insert(0) += 1;
        }
        Some(Self {
            total_attempts: attempts.len() as u32,
            failover_occurred: attempts_by_provider.len() > 1,
            attempts_by_provider,
            final_provider: last.provider.clone(),
            failures: attempts.iter().map(RedactedFailure::from).collect(),
            total_duration_ms,
            circuit_tripped: false,
        })
    }
}

/// Mask credentials and cap the length of an error message.
pub fn redact_error(message: &str) -> String {
    let mut redacted = message.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        redacted = pattern.replace_all(&redacted, "[REDACTED]").into_owned();
    }
    if redacted.chars().count() > MAX_REDACTED_LEN {
        let mut truncated: String = redacted.chars().take(MAX_REDACTED_LEN).collect();
        truncated.push_str("...");
        truncated
    } else {
        redacted
    }
}

pub struct RetryFailoverEngine {
    config: RetryConfig,
    circuits: Arc<CircuitBreaker>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryFailoverEngine {
    pub fn new(config: RetryConfig, circuits: Arc<CircuitBreaker>) -> Self {
        Self::with_sleeper(config, circuits, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        config: RetryConfig,
        circuits: Arc<CircuitBreaker>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            circuits,
            sleeper,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `factory`'s generator against `preferred`, failing over to `alternate`.
    pub async fn run(
        &self,
        factory: &dyn GeneratorFactory,
        context: &GenerationContext,
        preferred: Arc<dyn AiProvider>,
        alternate: Arc<dyn AiProvider>,
    ) -> Result<GeneratedContent, PipelineError> {
        let started = Instant::now();
        let providers = [preferred, alternate];
        let circuit_ids = [
            provider_circuit_id(providers[0].name()),
            provider_circuit_id(providers[1].name()),
        ];

        if !self.circuits.is_available(&circuit_ids[0])
            && !self.circuits.is_available(&circuit_ids[1])
        {
            warn!(
                preferred = %circuit_ids[0],
                alternate = %circuit_ids[1],
                "Both provider circuits open; no attempts made"
            );
            return Err(PipelineError::CircuitUnavailable {
                circuits: circuit_ids.to_vec(),
            });
        }

        let plan = AttemptPlan::new(self.config.attempts_per_provider);
        let mut skipped = [false, false];
        let mut circuit_tripped = false;
        let mut executed: u32 = 0;
        let mut attempts_by_provider: BTreeMap<String, u32> = BTreeMap::new();
        let mut failures: Vec<FailedAttempt> = Vec::new();

        for slot in plan.iter() {
            let index = slot.provider.index();
            if skipped[index] {
                continue;
            }
            let provider = &providers[index];
            let circuit_id = &circuit_ids[index];

            if !self.circuits.is_available(circuit_id) {
                info!(
                    provider = %provider.name(),
                    circuit_id = %circuit_id,
                    "Circuit open; skipping remaining attempts for provider"
                );
                skipped[index] = true;
                circuit_tripped = true;
                if slot.provider == ProviderSlot::Alternate {
                    break;
                }
                continue;
            }

            executed += 1;
            let delay = self.config.backoff_before(executed);
            if !delay.is_zero() {
                debug!(
                    provider = %provider.name(),
                    attempt = slot.attempt_number,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before attempt"
                );
                self.sleeper.sleep(delay).await;
            }

            *attempts_by_provider
                .entry(provider.name().to_string())
                .or_insert(0) += 1;

            let generator = factory.build(Arc::clone(provider));
            match generator.generate(context).await {
                Ok(mut content) => {
                    self.circuits.record_success(circuit_id);
                    if content.metadata.provider.is_none() {
                        content.metadata.provider = Some(provider.name().to_string());
                    }
                    let metadata = FailoverMetadata {
                        total_attempts: executed,
                        attempts_by_provider,
                        failover_occurred: slot.provider == ProviderSlot::Alternate,
                        final_provider: provider.name().to_string(),
                        failures: failures.iter().map(RedactedFailure::from).collect(),
                        total_duration_ms: started.elapsed().as_millis() as u64,
                        circuit_tripped,
                    };
                    if metadata.failover_occurred || executed > 1 {
                        info!(
                            provider = %provider.name(),
                            total_attempts = executed,
                            failover = metadata.failover_occurred,
                            "Generation succeeded after retry"
                        );
                    }
                    content.metadata.failover = Some(metadata);
                    return Ok(content);
                }
                Err(error) => {
                    self.circuits.record_failure(circuit_id, &error.to_string());
                    if !error.is_retryable() {
                        warn!(
                            provider = %provider.name(),
                            attempt = slot.attempt_number,
                            error = %error,
                            "Non-retryable provider error"
                        );
                        return Err(PipelineError::Provider(error));
                    }
                    warn!(
                        provider = %provider.name(),
                        attempt = slot.attempt_number,
                        error = %error,
                        "Retryable provider error"
                    );
                    failures.push(FailedAttempt {
                        provider: provider.name().to_string(),
                        attempt: slot.attempt_number,
                        error,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        if failures.is_empty() {
            // Nothing ran: the preferred circuit was open and the alternate opened too.
            return Err(PipelineError::CircuitUnavailable {
                circuits: circuit_ids.to_vec(),
            });
        }
        warn!(attempts = failures.len(), "All retry attempts exhausted");
        Err(PipelineError::RetryExhausted { attempts: failures })
    }
}
