//! Periodic driver for the orchestrator.
//!
//! A single interval ticks at the minor cadence; a tick becomes a major cycle once
//! `major_interval_secs` has elapsed since the last scheduled major. Trigger events arrive
//! on an mpsc channel and run an immediate major cycle. A watch channel stops the loop.

use crate::generator::TriggerEvent;
use crate::orchestrator::{CycleOutcome, CycleRequest, Orchestrator};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between frame refreshes
    #[serde(default = "default_minor_interval")]
    pub minor_interval_secs: u64,
    /// Seconds between full regenerations
    #[serde(default = "default_major_interval")]
    pub major_interval_secs: u64,
    /// Run a major cycle on the first tick instead of waiting a full interval
    #[serde(default = "default_true")]
    pub major_on_start: bool,
}

fn default_minor_interval() -> u64 {
    60
}

fn default_major_interval() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            minor_interval_secs: default_minor_interval(),
            major_interval_secs: default_major_interval(),
            major_on_start: default_true(),
        }
    }
}

/// Sending half used by event sources and the shutdown path.
#[derive(Clone)]
pub struct SchedulerHandle {
    triggers: mpsc::Sender<TriggerEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Queue a trigger event; fails once the scheduler has stopped.
    pub async fn trigger(&self, event: TriggerEvent) -> Result<(), TriggerEvent> {
        self.triggers.send(event).await.map_err(|e| e.0)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: ScheduleConfig,
    triggers: mpsc::Receiver<TriggerEvent>,
    shutdown: watch::Receiver<bool>,
}

const TRIGGER_CAPACITY: usize = 32;

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ScheduleConfig) -> (Self, SchedulerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                orchestrator,
                config,
                triggers: trigger_rx,
                shutdown: shutdown_rx,
            },
            SchedulerHandle {
                triggers: trigger_tx,
                shutdown: Arc::new(shutdown_tx),
            },
        )
    }

    /// Run until shutdown is signalled or every handle is dropped.
    pub async fn run(mut self) {
        let minor = Duration::from_secs(self.config.minor_interval_secs.max(1));
        let major = Duration::from_secs(self.config.major_interval_secs.max(1));
        let mut ticker = tokio::time::interval(minor);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_major = if self.config.major_on_start {
            None
        } else {
            Some(Instant::now())
        };

        info!(
            minor_secs = minor.as_secs(),
            major_secs = major.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                Some(event) = self.triggers.recv() => {
                    info!(event_type = %event.event_type, "Trigger event received");
                    self.run_cycle(CycleRequest::major(Utc::now()).with_trigger(event)).await;
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    if is_major_due(last_major, now, major) {
                        last_major = Some(now);
                        self.run_cycle(CycleRequest::major(Utc::now())).await;
                    } else {
                        self.run_cycle(CycleRequest::minor(Utc::now())).await;
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }

    async fn run_cycle(&self, request: CycleRequest) {
        let update_type = request.update_type;
        match self.orchestrator.generate_and_send(request).await {
            Ok(CycleOutcome::Skipped(reason)) => {
                debug!(update_type = ?update_type, reason = %reason, "Cycle skipped")
            }
            Ok(outcome) => debug!(update_type = ?update_type, outcome = ?outcome, "Cycle complete"),
            Err(e) => error!(update_type = ?update_type, error = %e, "Cycle failed"),
        }
    }
}

fn is_major_due(last_major: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last_major {
        None => true,
        Some(last) => now.duration_since(last) >= interval,
    }
}
