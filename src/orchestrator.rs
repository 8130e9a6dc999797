//! Orchestrator
//!
//! Composes selection, retry/failover, validation, framing, delivery and persistence into
//! one request/response cycle, and caches the last major result so minor cycles can refresh
//! only the frame chrome. Cycles are serialized by an in-flight guard.

pub mod delivery;
pub mod frame;
pub mod persistence;

use crate::circuit::{
    provider_circuit_id, CircuitBreaker, CircuitRecord, SwitchPosition, MASTER_SWITCH, SLEEP_MODE,
};
use crate::content::GeneratedContent;
use crate::display::{Layout, OutputValidator, ValidationResult};
use crate::error::PipelineError;
use crate::generator::registry::{GeneratorRegistry, RegisteredGenerator};
use crate::generator::selector::{GeneratorSelector, SelectionRequest};
use crate::generator::{GenerationContext, GeneratorRegistration, PriorityTier, TriggerEvent};
use crate::provider::{AiProvider, ConnectionCheck};
use crate::retry::{FailoverMetadata, RetryFailoverEngine};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub use delivery::{
    DeliveryClient, DeliveryConfig, DeliveryMode, DryRunDelivery, LocalApiDelivery,
};
pub use frame::{ClockFrame, FrameConfig, FrameDecorator, FramedLayout, WeatherSource};
pub use persistence::{AttemptRecord, NullSink, PersistenceSink, SledAttemptLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Full regeneration
    Major,
    /// Frame refresh around cached content
    Minor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleRequest {
    pub update_type: UpdateType,
    pub timestamp: DateTime<Utc>,
    pub generator_id: Option<String>,
    pub trigger: Option<TriggerEvent>,
}

impl CycleRequest {
    pub fn major(timestamp: DateTime<Utc>) -> Self {
        Self {
            update_type: UpdateType::Major,
            timestamp,
            generator_id: None,
            trigger: None,
        }
    }

    pub fn minor(timestamp: DateTime<Utc>) -> Self {
        Self {
            update_type: UpdateType::Minor,
            ..Self::major(timestamp)
        }
    }

    pub fn with_generator(mut self, generator_id: impl Into<String>) -> Self {
        self.generator_id = Some(generator_id.into());
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerEvent) -> Self {
        self.trigger = Some(trigger);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MasterSwitchOff,
    SleepMode,
    NoCachedContent,
    /// Cached content has no frame region to refresh
    Unframed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MasterSwitchOff => write!(f, "master switch is off"),
            SkipReason::SleepMode => write!(f, "sleep mode is active"),
            SkipReason::NoCachedContent => write!(f, "no cached content to refresh"),
            SkipReason::Unframed => write!(f, "cached content has no frame"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent {
        generator_id: String,
        used_fallback: bool,
    },
    Refreshed,
    Skipped(SkipReason),
}

/// Last successfully sent major content.
#[derive(Debug, Clone)]
struct CachedContent {
    content: GeneratedContent,
    validation: ValidationResult,
    apply_frame: bool,
}

/// Content that passed validation, ready to render.
struct Produced {
    entry: RegisteredGenerator,
    content: GeneratedContent,
    validation: ValidationResult,
}

pub struct Orchestrator {
    registry: Arc<GeneratorRegistry>,
    selector: GeneratorSelector,
    engine: RetryFailoverEngine,
    circuits: Arc<CircuitBreaker>,
    validator: OutputValidator,
    preferred: Arc<dyn AiProvider>,
    alternate: Arc<dyn AiProvider>,
    providers: BTreeMap<String, Arc<dyn AiProvider>>,
    frame: Arc<dyn FrameDecorator>,
    delivery: Arc<dyn DeliveryClient>,
    persistence: Arc<dyn PersistenceSink>,
    cache: RwLock<Option<CachedContent>>,
    cycle_guard: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    /// Orchestrator with a clock frame, dry-run delivery and no persistence.
    pub fn new(
        registry: Arc<GeneratorRegistry>,
        engine: RetryFailoverEngine,
        circuits: Arc<CircuitBreaker>,
        preferred: Arc<dyn AiProvider>,
        alternate: Arc<dyn AiProvider>,
    ) -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(preferred.name().to_string(), Arc::clone(&preferred));
        providers.insert(alternate.name().to_string(), Arc::clone(&alternate));
        Self {
            registry,
            selector: GeneratorSelector::new(),
            engine,
            circuits,
            validator: OutputValidator::new(),
            preferred,
            alternate,
            providers,
            frame: Arc::new(ClockFrame::default()),
            delivery: Arc::new(DryRunDelivery),
            persistence: Arc::new(NullSink),
            cache: RwLock::new(None),
            cycle_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_selector(mut self, selector: GeneratorSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_frame(mut self, frame: Arc<dyn FrameDecorator>) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryClient>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Make an extra provider reachable through `probe_provider`.
    pub fn with_provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Run one cycle. Overlapping calls wait for the cycle in flight.
    pub async fn generate_and_send(
        &self,
        request: CycleRequest,
    ) -> Result<CycleOutcome, PipelineError> {
        let _guard = self.cycle_guard.lock().await;

        if let Some(reason) = self.gate() {
            info!(reason = %reason, update_type = ?request.update_type, "Cycle skipped");
            return Ok(CycleOutcome::Skipped(reason));
        }

        match request.update_type {
            UpdateType::Major => self.major_cycle(&request).await,
            UpdateType::Minor => self.minor_cycle(&request).await,
        }
    }

    pub fn get_cached_content(&self) -> Option<GeneratedContent> {
        self.cache.read().as_ref().map(|cached| cached.content.clone())
    }

    pub fn list_circuits(&self) -> Result<Vec<CircuitRecord>, PipelineError> {
        self.circuits.list_circuits()
    }

    pub fn set_manual_circuit(
        &self,
        circuit_id: &str,
        position: SwitchPosition,
    ) -> Result<CircuitRecord, PipelineError> {
        self.circuits.set_manual_circuit(circuit_id, position)
    }

    pub fn reset_circuit(&self, circuit_id: &str) -> Result<CircuitRecord, PipelineError> {
        self.circuits.reset_circuit(circuit_id)
    }

    /// Manual recovery: a successful connection check closes the provider's circuit.
    pub async fn probe_provider(&self, name: &str) -> Result<ConnectionCheck, PipelineError> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| PipelineError::Config(format!("Unknown provider: {}", name)))?;
        let check = provider.validate_connection().await;
        if check.success {
            self.circuits.record_success(&provider_circuit_id(name));
        } else {
            warn!(
                provider = %name,
                detail = check.message.as_deref().unwrap_or(""),
                "Provider probe failed; circuit left unchanged"
            );
        }
        Ok(check)
    }

    /// Probe every known provider concurrently, in name order.
    pub async fn probe_all(&self) -> Vec<(String, ConnectionCheck)> {
        let names: Vec<String> = self.providers.keys().cloned().collect();
        let checks = join_all(names.iter().map(|name| self.probe_provider(name))).await;
        names
            .into_iter()
            .zip(checks)
            .filter_map(|(name, check)| check.ok().map(|check| (name, check)))
            .collect()
    }

    fn gate(&self) -> Option<SkipReason> {
        if !self.circuits.is_available(MASTER_SWITCH) {
            return Some(SkipReason::MasterSwitchOff);
        }
        if !self.circuits.is_available(SLEEP_MODE) {
            return Some(SkipReason::SleepMode);
        }
        None
    }

    async fn major_cycle(&self, request: &CycleRequest) -> Result<CycleOutcome, PipelineError> {
        let started = Instant::now();
        let selection = SelectionRequest {
            trigger: request.trigger.as_ref(),
            generator_id: request.generator_id.as_deref(),
            force_fallback: false,
        };
        let selected = match self.selector.select(&self.registry, &selection) {
            Ok(selected) => selected,
            Err(e) => {
                self.record_failure(request, None, &e, false, started).await;
                return Err(e);
            }
        };

        let context = GenerationContext::new(request.timestamp)
            .with_trigger(request.trigger.clone())
            .with_model_tier(selected.registration.model_tier);

        let (produced, used_fallback) = match self.produce(&selected, &context).await {
            Ok(produced) => (produced, false),
            Err(e)
                if e.triggers_fallback()
                    && selected.registration.priority_tier != PriorityTier::Fallback =>
            {
                warn!(
                    generator_id = %selected.id(),
                    error = %e,
                    "Primary generation failed; invoking FALLBACK tier"
                );
                self.record_failure(request, Some(selected.id()), &e, false, started)
                    .await;
                match self.produce_fallback(&context).await {
                    Ok(produced) => (produced, true),
                    Err(fallback_error) => {
                        error!(
                            error = %fallback_error,
                            "FALLBACK generation failed; cycle aborted"
                        );
                        self.record_failure(request, None, &fallback_error, true, started)
                            .await;
                        return Err(fallback_error);
                    }
                }
            }
            Err(e) => {
                error!(
                    generator_id = %selected.id(),
                    error = %e,
                    "Generation failed; cycle aborted"
                );
                self.record_failure(request, Some(selected.id()), &e, false, started)
                    .await;
                return Err(e);
            }
        };

        let generator_id = produced.entry.id().to_string();
        let delivered = match self
            .render(&produced.entry.registration, &produced, request.timestamp)
            .await
        {
            Ok(layout) => self.delivery.send(&layout).await,
            Err(e) => Err(e),
        };
        if let Err(e) = delivered {
            error!(generator_id = %generator_id, error = %e, "Delivery failed; cycle aborted");
            self.record_failure(request, Some(&generator_id), &e, used_fallback, started)
                .await;
            return Err(e);
        }

        self.persist(AttemptRecord {
            timestamp: request.timestamp,
            generator_id: Some(generator_id.clone()),
            provider: produced.content.metadata.provider.clone(),
            model: produced.content.metadata.model.clone(),
            success: true,
            used_fallback,
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
            failover: produced.content.metadata.failover.clone(),
            text: Some(produced.validation.normalized_text.clone()),
        })
        .await;

        info!(
            generator_id = %generator_id,
            used_fallback,
            duration_ms = started.elapsed().as_millis() as u64,
            "Major cycle sent"
        );
        *self.cache.write() = Some(CachedContent {
            apply_frame: produced.entry.registration.apply_frame,
            content: produced.content,
            validation: produced.validation,
        });

        Ok(CycleOutcome::Sent {
            generator_id,
            used_fallback,
        })
    }

    async fn minor_cycle(&self, request: &CycleRequest) -> Result<CycleOutcome, PipelineError> {
        let cached = self.cache.read().clone();
        let Some(cached) = cached else {
            return Ok(CycleOutcome::Skipped(SkipReason::NoCachedContent));
        };
        if !cached.content.is_text() || !cached.apply_frame {
            return Ok(CycleOutcome::Skipped(SkipReason::Unframed));
        }

        let framed = self
            .frame
            .decorate(&cached.validation.normalized_text, request.timestamp)
            .await?;
        for warning in &framed.warnings {
            warn!(warning = %warning, "Frame warning");
        }
        self.delivery.send(&framed.layout).await?;
        Ok(CycleOutcome::Refreshed)
    }

    /// Generate and validate. Providerless generators run directly; the rest go through
    /// retry/failover.
    async fn produce(
        &self,
        entry: &RegisteredGenerator,
        context: &GenerationContext,
    ) -> Result<Produced, PipelineError> {
        let mut content = match entry.factory.build_standalone() {
            Some(generator) => generator.generate(context).await?,
            None => {
                self.engine
                    .run(
                        entry.factory.as_ref(),
                        context,
                        Arc::clone(&self.preferred),
                        Arc::clone(&self.alternate),
                    )
                    .await?
            }
        };
        content.metadata.generator_id = Some(entry.id().to_string());

        let validation = self.validator.validate(&content)?;
        if validation.wrapping_applied || validation.truncation_applied || validation.emoji_stripped
        {
            info!(
                generator_id = %entry.id(),
                wrapped = validation.wrapping_applied,
                truncated = validation.truncation_applied,
                emoji_stripped = validation.emoji_stripped,
                "Output salvaged during validation"
            );
        }
        content.metadata.validation = Some(validation.clone());
        Ok(Produced {
            entry: entry.clone(),
            content,
            validation,
        })
    }

    async fn produce_fallback(
        &self,
        context: &GenerationContext,
    ) -> Result<Produced, PipelineError> {
        let fallback = self.selector.select(
            &self.registry,
            &SelectionRequest {
                force_fallback: true,
                ..Default::default()
            },
        )?;
        self.produce(&fallback, context).await
    }

    async fn render(
        &self,
        registration: &GeneratorRegistration,
        produced: &Produced,
        timestamp: DateTime<Utc>,
    ) -> Result<Layout, PipelineError> {
        if produced.content.is_text() && registration.apply_frame {
            let framed = self
                .frame
                .decorate(&produced.validation.normalized_text, timestamp)
                .await?;
            for warning in &framed.warnings {
                warn!(warning = %warning, "Frame warning");
            }
            return Ok(framed.layout);
        }
        Ok(self.validator.encode(&produced.content, &produced.validation)?)
    }

    async fn record_failure(
        &self,
        request: &CycleRequest,
        generator_id: Option<&str>,
        error: &PipelineError,
        used_fallback: bool,
        started: Instant,
    ) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let failover = FailoverMetadata::from_failed_attempts(error.attempts(), duration_ms);
        self.persist(AttemptRecord {
            timestamp: request.timestamp,
            generator_id: generator_id.map(str::to_string),
            provider: failover.as_ref().map(|f| f.final_provider.clone()),
            model: None,
            success: false,
            used_fallback,
            error: Some(error.to_string()),
            duration_ms,
            failover,
            text: None,
        })
        .await;
    }

    async fn persist(&self, record: AttemptRecord) {
        if let Err(e) = self.persistence.record_attempt(&record).await {
            warn!(error = %e, "Failed to persist attempt record");
        }
    }
}
