//! Circuit Breaker
//!
//! Tracks the health of named circuits: one per AI provider plus operator-controlled
//! manual switches. Provider circuits open after `failure_threshold` recorded failures and
//! stay open until an explicit reset or a successful manual probe; there is no timed
//! half-open recovery. The breaker is a best-effort signal: storage failures never block
//! generation (reads fail open, writes are logged and dropped).

pub mod store;

use crate::error::{PipelineError, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use store::{CircuitStore, MemoryCircuitStore, SledCircuitStore};

/// Prefix applied to upper-cased provider names to form their circuit id
pub const PROVIDER_PREFIX: &str = "PROVIDER_";
/// Master kill switch; OFF blocks every cycle
pub const MASTER_SWITCH: &str = "MASTER_SWITCH";
/// Sleep-mode suppressor; OFF blocks every cycle
pub const SLEEP_MODE: &str = "SLEEP_MODE";

const MAX_ERROR_LEN: usize = 240;

/// Circuit id for a provider name, e.g. `openai` -> `PROVIDER_OPENAI`.
pub fn provider_circuit_id(provider: &str) -> String {
    format!("{}{}", PROVIDER_PREFIX, provider.to_uppercase())
}

fn kind_for(circuit_id: &str) -> CircuitKind {
    if circuit_id.starts_with(PROVIDER_PREFIX) {
        CircuitKind::Provider
    } else {
        CircuitKind::Manual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Usable
    Closed,
    /// Blocked until reset
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitKind {
    /// Driven by recorded provider failures
    Provider,
    /// Toggled only by an operator
    Manual,
}

/// Operator position of a manual switch. `On` closes the circuit, `Off` opens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPosition {
    On,
    Off,
}

impl FromStr for SwitchPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(SwitchPosition::On),
            "off" => Ok(SwitchPosition::Off),
            other => Err(format!("Invalid switch position '{}' (expected on|off)", other)),
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
        }
    }
}

/// Persisted state of one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub circuit_id: String,
    pub kind: CircuitKind,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_transition_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl CircuitRecord {
    pub fn new(circuit_id: impl Into<String>, kind: CircuitKind, failure_threshold: u32) -> Self {
        Self {
            circuit_id: circuit_id.into(),
            kind,
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold,
            last_transition_at: None,
            last_error: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    fn transition(&mut self, state: CircuitState) {
        if self.state != state {
            self.state = state;
            self.last_transition_at = Some(Utc::now());
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Recorded failures that open a provider circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Persist circuit state in the sled database so admin changes and open
    /// circuits survive restarts
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_persistent() -> bool {
    true
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            persistent: default_persistent(),
        }
    }
}

/// Health tracker for provider and manual circuits.
pub struct CircuitBreaker {
    store: Arc<dyn CircuitStore>,
    config: CircuitConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn CircuitStore>, config: CircuitConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Breaker backed by a process-local store.
    pub fn in_memory(config: CircuitConfig) -> Self {
        Self::new(MemoryCircuitStore::shared(), config)
    }

    /// False only when the circuit is OPEN; lookup failures fail open.
    pub fn is_available(&self, circuit_id: &str) -> bool {
        match self.store.load(circuit_id) {
            Ok(Some(record)) => !record.is_open(),
            Ok(None) => true,
            Err(e) => {
                warn!(
                    circuit_id = %circuit_id,
                    error = %e,
                    "Circuit lookup failed, treating circuit as available"
                );
                true
            }
        }
    }

    /// Count a failure against a provider circuit, opening it at the threshold.
    pub fn record_failure(&self, circuit_id: &str, error: &str) {
        if kind_for(circuit_id) == CircuitKind::Manual {
            warn!(circuit_id = %circuit_id, "Ignoring failure recorded against manual circuit");
            return;
        }

        let outcome = self.mutate(circuit_id, |record| {
            record.failure_count = record.failure_count.saturating_add(1);
            record.last_error = Some(error.chars().take(MAX_ERROR_LEN).collect());
            if !record.is_open() && record.failure_count >= record.failure_threshold {
                record.transition(CircuitState::Open);
                return true;
            }
            false
        });

        match outcome {
            Ok((record, true)) => {
                warn!(
                    circuit_id = %circuit_id,
                    failures = record.failure_count,
                    "Circuit opened; manual reset required"
                );
            }
            Ok((record, false)) => {
                debug!(
                    circuit_id = %circuit_id,
                    failures = record.failure_count,
                    threshold = record.failure_threshold,
                    "Recorded circuit failure"
                );
            }
            Err(e) => {
                warn!(circuit_id = %circuit_id, error = %e, "Failed to record circuit failure");
            }
        }
    }

    /// Reset the failure count; an OPEN provider circuit closes (manual recovery path).
    pub fn record_success(&self, circuit_id: &str) {
        if kind_for(circuit_id) == CircuitKind::Manual {
            warn!(circuit_id = %circuit_id, "Ignoring success recorded against manual circuit");
            return;
        }

        let outcome = self.mutate(circuit_id, |record| {
            let was_open = record.is_open();
            record.failure_count = 0;
            record.transition(CircuitState::Closed);
            was_open
        });

        match outcome {
            Ok((_, true)) => {
                info!(circuit_id = %circuit_id, "Circuit closed after successful probe")
            }
            Ok((_, false)) => {}
            Err(e) => {
                warn!(circuit_id = %circuit_id, error = %e, "Failed to record circuit success");
            }
        }
    }

    pub fn get_status(&self, circuit_id: &str) -> Option<CircuitRecord> {
        match self.store.load(circuit_id) {
            Ok(record) => record,
            Err(e) => {
                warn!(circuit_id = %circuit_id, error = %e, "Circuit status lookup failed");
                None
            }
        }
    }

    /// All stored circuits plus the built-in manual switches, sorted by id.
    pub fn list_circuits(&self) -> Result<Vec<CircuitRecord>, PipelineError> {
        let mut records = self.store.list()?;
        for switch in [MASTER_SWITCH, SLEEP_MODE] {
            if !records.iter().any(|r| r.circuit_id == switch) {
                records.push(CircuitRecord::new(
                    switch,
                    CircuitKind::Manual,
                    self.config.failure_threshold,
                ));
            }
        }
        records.sort_by(|a, b| a.circuit_id.cmp(&b.circuit_id));
        Ok(records)
    }

    /// Operator toggle for a manual switch.
    pub fn set_manual_circuit(
        &self,
        circuit_id: &str,
        position: SwitchPosition,
    ) -> Result<CircuitRecord, PipelineError> {
        if kind_for(circuit_id) != CircuitKind::Manual {
            return Err(PipelineError::Config(format!(
                "{} is a provider circuit; use reset instead",
                circuit_id
            )));
        }
        let (record, _) = self.mutate(circuit_id, |record| {
            record.transition(match position {
                SwitchPosition::On => CircuitState::Closed,
                SwitchPosition::Off => CircuitState::Open,
            });
        })?;
        info!(circuit_id = %circuit_id, state = %record.state, "Manual circuit switched");
        Ok(record)
    }

    /// Explicitly close a circuit and clear its failure count.
    pub fn reset_circuit(&self, circuit_id: &str) -> Result<CircuitRecord, PipelineError> {
        let (record, _) = self.mutate(circuit_id, |record| {
            record.failure_count = 0;
            record.last_error = None;
            record.transition(CircuitState::Closed);
        })?;
        info!(circuit_id = %circuit_id, "Circuit reset");
        Ok(record)
    }

    fn lock_for(&self, circuit_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(circuit_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read-modify-write under the per-circuit lock; creates the record lazily.
    fn mutate<T, F>(&self, circuit_id: &str, f: F) -> Result<(CircuitRecord, T), StorageError>
    where
        F: FnOnce(&mut CircuitRecord) -> T,
    {
        let lock = self.lock_for(circuit_id);
        let _guard = lock.lock();
        let mut record = self.store.load(circuit_id)?.unwrap_or_else(|| {
            CircuitRecord::new(
                circuit_id,
                kind_for(circuit_id),
                self.config.failure_threshold,
            )
        });
        let value = f(&mut record);
        self.store.save(&record)?;
        Ok((record, value))
    }
}
