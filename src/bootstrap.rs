//! Wiring from `BoardConfig` to a ready orchestrator.

use crate::circuit::{CircuitBreaker, MemoryCircuitStore, SledCircuitStore};
use crate::config::BoardConfig;
use crate::error::PipelineError;
use crate::generator::{
    GeneratorFactory, GeneratorRegistration, GeneratorRegistry, NotificationEntry,
    NotificationTable, PriorityTier, PromptGeneratorFactory, StaticFallbackFactory,
    TemplateFormatter, TriggerPattern, WithTools,
};
use crate::orchestrator::{
    delivery::create_delivery, ClockFrame, NullSink, Orchestrator, PersistenceSink, SledAttemptLog,
};
use crate::provider::{AiProvider, ProviderFactory};
use crate::retry::RetryFailoverEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Build the generator registry: prompt generators, notification rows, then the fallback.
pub fn build_registry(config: &BoardConfig) -> Result<GeneratorRegistry, PipelineError> {
    let mut registry = GeneratorRegistry::new();

    for generator in config.generators.iter().filter(|g| g.enabled) {
        let mut registration = GeneratorRegistration::new(
            &generator.id,
            generator.name.as_deref().unwrap_or(&generator.id),
            generator.priority_tier,
        )
        .with_model_tier(generator.model_tier)
        .with_apply_frame(generator.apply_frame);
        if let Some(pattern) = &generator.event_trigger_pattern {
            let pattern = TriggerPattern::new(pattern).map_err(|e| {
                PipelineError::Config(format!("Generator '{}': {}", generator.id, e))
            })?;
            registration = registration.with_trigger_pattern(pattern);
        }
        for tag in &generator.tags {
            registration = registration.with_tag(tag);
        }

        let prompt: Arc<dyn GeneratorFactory> = Arc::new(
            PromptGeneratorFactory::new(&generator.system_prompt, &generator.user_prompt)
                .with_output_mode(generator.output_mode)
                .with_max_tokens(generator.max_tokens),
        );
        let factory: Arc<dyn GeneratorFactory> = if generator.tools.is_empty() {
            prompt
        } else {
            Arc::new(WithTools::new(prompt, generator.tools.clone()))
        };

        registry.register(registration, factory)?;
    }

    let mut table = NotificationTable::new();
    for notification in &config.notifications {
        let pattern = TriggerPattern::new(&notification.pattern).map_err(|e| {
            PipelineError::Config(format!("Notification '{}': {}", notification.id, e))
        })?;
        let mut entry = NotificationEntry::new(
            &notification.id,
            notification.name.as_deref().unwrap_or(&notification.id),
            pattern,
            Arc::new(TemplateFormatter::new(&notification.template)),
        );
        entry.apply_frame = notification.apply_frame;
        table.push(entry);
    }
    table.register_into(&mut registry)?;

    registry.register(
        GeneratorRegistration::new(&config.fallback.id, "Static fallback", PriorityTier::Fallback)
            .with_apply_frame(config.fallback.apply_frame)
            .with_tag("fallback"),
        Arc::new(StaticFallbackFactory::new(config.fallback.messages.clone())),
    )?;

    debug!(generators = registry.len(), "Generator registry built");
    Ok(registry)
}

/// Clients for the routed provider slots plus any other configured providers.
pub struct ProviderSet {
    pub preferred: Arc<dyn AiProvider>,
    pub alternate: Arc<dyn AiProvider>,
    pub others: Vec<Arc<dyn AiProvider>>,
}

pub fn build_providers(config: &BoardConfig) -> Result<ProviderSet, PipelineError> {
    let create = |name: &str| -> Result<Arc<dyn AiProvider>, PipelineError> {
        let provider_config = config.providers.get(name).ok_or_else(|| {
            PipelineError::Config(format!("Provider '{}' is not configured", name))
        })?;
        ProviderFactory::create_client(name, provider_config)
    };

    let preferred = create(&config.routing.preferred)?;
    let alternate = create(&config.routing.alternate)?;

    let mut names: Vec<&String> = config
        .providers
        .keys()
        .filter(|name| **name != config.routing.preferred && **name != config.routing.alternate)
        .collect();
    names.sort();
    let others = names
        .into_iter()
        .map(|name| create(name))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProviderSet {
        preferred,
        alternate,
        others,
    })
}

/// Resolve the sled state directory against the workspace root.
pub fn state_path(config: &BoardConfig, workspace_root: &Path) -> PathBuf {
    if config.storage.path.is_absolute() {
        config.storage.path.clone()
    } else {
        workspace_root.join(&config.storage.path)
    }
}

/// Open the state database when circuit persistence or the attempt log needs it.
pub fn open_state(
    config: &BoardConfig,
    workspace_root: &Path,
) -> Result<Option<sled::Db>, PipelineError> {
    if !config.circuit.persistent && !config.storage.record_attempts {
        return Ok(None);
    }
    let path = state_path(config, workspace_root);
    std::fs::create_dir_all(&path).map_err(|e| {
        PipelineError::Config(format!(
            "Failed to create state directory {}: {}",
            path.display(),
            e
        ))
    })?;
    let db = sled::open(&path).map_err(|e| PipelineError::Storage(e.into()))?;
    debug!(path = %path.display(), "State database opened");
    Ok(Some(db))
}

/// Everything the binary needs from a loaded configuration.
pub struct Runtime {
    pub orchestrator: Arc<Orchestrator>,
    pub attempt_log: Option<Arc<SledAttemptLog>>,
}

/// Validate the configuration and assemble the orchestrator with its collaborators.
pub fn build_runtime(
    config: &BoardConfig,
    workspace_root: &Path,
) -> Result<Runtime, PipelineError> {
    config.validate().map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        PipelineError::Config(format!(
            "Configuration validation failed:\n{}",
            messages.join("\n")
        ))
    })?;

    let registry = Arc::new(build_registry(config)?);
    let providers = build_providers(config)?;
    let db = open_state(config, workspace_root)?;

    let circuits = match (&db, config.circuit.persistent) {
        (Some(db), true) => Arc::new(CircuitBreaker::new(
            SledCircuitStore::shared(db)?,
            config.circuit.clone(),
        )),
        _ => Arc::new(CircuitBreaker::new(
            MemoryCircuitStore::shared(),
            config.circuit.clone(),
        )),
    };

    let attempt_log = match (&db, config.storage.record_attempts) {
        (Some(db), true) => Some(SledAttemptLog::shared(db)?),
        _ => None,
    };
    let persistence: Arc<dyn PersistenceSink> = match &attempt_log {
        Some(log) => Arc::clone(log) as Arc<dyn PersistenceSink>,
        None => Arc::new(NullSink),
    };

    let engine = RetryFailoverEngine::new(config.retry.clone(), Arc::clone(&circuits));
    let mut orchestrator = Orchestrator::new(
        registry,
        engine,
        circuits,
        providers.preferred,
        providers.alternate,
    )
    .with_frame(Arc::new(ClockFrame::new(config.frame.clone())))
    .with_delivery(create_delivery(&config.delivery)?)
    .with_persistence(persistence);
    for provider in providers.others {
        orchestrator = orchestrator.with_provider(provider);
    }

    info!(
        preferred = %config.routing.preferred,
        alternate = %config.routing.alternate,
        generators = orchestrator.registry().len(),
        delivery = ?config.delivery.mode,
        "Runtime assembled"
    );

    Ok(Runtime {
        orchestrator: Arc::new(orchestrator),
        attempt_log,
    })
}
