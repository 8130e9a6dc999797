//! Generator registry: in-memory catalog of registrations and their factories.

use crate::error::PipelineError;
use crate::generator::{GeneratorFactory, GeneratorRegistration, PriorityTier};
use std::sync::Arc;

/// A registration paired with the factory that builds its generator.
#[derive(Clone)]
pub struct RegisteredGenerator {
    pub registration: Arc<GeneratorRegistration>,
    pub factory: Arc<dyn GeneratorFactory>,
}

impl RegisteredGenerator {
    pub fn id(&self) -> &str {
        &self.registration.id
    }
}

impl std::fmt::Debug for RegisteredGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredGenerator")
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

/// Generator registry
///
/// Built once at startup and shared by reference; registration order is preserved and is
/// the tie-break for notification matching.
#[derive(Default)]
pub struct GeneratorRegistry {
    entries: Vec<RegisteredGenerator>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator. Ids are unique and at most one FALLBACK registration exists.
    pub fn register(
        &mut self,
        registration: GeneratorRegistration,
        factory: Arc<dyn GeneratorFactory>,
    ) -> Result<(), PipelineError> {
        if self.get(&registration.id).is_some() {
            return Err(PipelineError::Config(format!(
                "Duplicate generator id: {}",
                registration.id
            )));
        }
        if registration.priority_tier == PriorityTier::Fallback {
            if let Some(existing) = self.fallback() {
                return Err(PipelineError::Config(format!(
                    "Generator '{}' cannot be a second FALLBACK (already '{}')",
                    registration.id,
                    existing.id()
                )));
            }
        }
        self.entries.push(RegisteredGenerator {
            registration: Arc::new(registration),
            factory,
        });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredGenerator> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn get_or_error(&self, id: &str) -> Result<&RegisteredGenerator, PipelineError> {
        self.get(id)
            .ok_or_else(|| PipelineError::GeneratorNotFound(id.to_string()))
    }

    /// All registrations in registration order.
    pub fn get_all(&self) -> &[RegisteredGenerator] {
        &self.entries
    }

    pub fn by_priority_tier(&self, tier: PriorityTier) -> Vec<&RegisteredGenerator> {
        self.entries
            .iter()
            .filter(|entry| entry.registration.priority_tier == tier)
            .collect()
    }

    pub fn fallback(&self) -> Option<&RegisteredGenerator> {
        self.entries
            .iter()
            .find(|entry| entry.registration.priority_tier == PriorityTier::Fallback)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
