//! Generator selection for one cycle.

use crate::error::PipelineError;
use crate::generator::registry::{GeneratorRegistry, RegisteredGenerator};
use crate::generator::{PriorityTier, TriggerEvent};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// What the cycle asks for.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionRequest<'a> {
    pub trigger: Option<&'a TriggerEvent>,
    /// Explicit invocation; bypasses priority logic
    pub generator_id: Option<&'a str>,
    /// Skip straight to the FALLBACK registration
    pub force_fallback: bool,
}

pub struct GeneratorSelector {
    rng: Mutex<StdRng>,
}

impl Default for GeneratorSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorSelector {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick exactly one generator.
    ///
    /// Order: explicit id, forced fallback, first matching NOTIFICATION for a trigger,
    /// uniform random NORMAL, then the FALLBACK registration. A trigger nothing matches
    /// falls through to the NORMAL pick.
    pub fn select(
        &self,
        registry: &GeneratorRegistry,
        request: &SelectionRequest<'_>,
    ) -> Result<RegisteredGenerator, PipelineError> {
        if let Some(id) = request.generator_id {
            debug!(generator_id = %id, "Explicit generator requested");
            return registry.get_or_error(id).cloned();
        }

        if request.force_fallback {
            return Self::fallback(registry);
        }

        if let Some(event) = request.trigger {
            let matched = registry
                .by_priority_tier(PriorityTier::Notification)
                .into_iter()
                .find(|entry| entry.registration.matches_event(&event.event_type));
            if let Some(entry) = matched {
                return Ok(entry.clone());
            }
            debug!(event_type = %event.event_type, "No NOTIFICATION generator matches event");
        }

        let normals = registry.by_priority_tier(PriorityTier::Normal);
        if let Some(chosen) = normals.choose(&mut *self.rng.lock()) {
            debug!(
                generator_id = %chosen.id(),
                candidates = normals.len(),
                "Selected NORMAL generator"
            );
            return Ok((*chosen).clone());
        }

        debug!("No NORMAL generators registered; using FALLBACK");
        Self::fallback(registry)
    }

    fn fallback(registry: &GeneratorRegistry) -> Result<RegisteredGenerator, PipelineError> {
        registry.fallback().cloned().ok_or_else(|| {
            PipelineError::NoGeneratorAvailable("no FALLBACK generator registered".to_string())
        })
    }
}
