//! Last-resort static messages.

use crate::content::GeneratedContent;
use crate::error::ProviderError;
use crate::generator::{GenerationContext, Generator, GeneratorFactory};
use crate::provider::AiProvider;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Rotates through configured messages; never calls a provider.
pub struct StaticFallback {
    messages: Arc<Vec<String>>,
    cursor: Arc<AtomicUsize>,
}

#[async_trait]
impl Generator for StaticFallback {
    async fn generate(
        &self,
        _context: &GenerationContext,
    ) -> Result<GeneratedContent, ProviderError> {
        if self.messages.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.messages.len();
        Ok(GeneratedContent::text(self.messages[index].clone())
            .with_extra("fallback_index", serde_json::json!(index)))
    }
}

/// Factory sharing one rotation cursor across every generator it builds.
pub struct StaticFallbackFactory {
    messages: Arc<Vec<String>>,
    cursor: Arc<AtomicUsize>,
}

impl StaticFallbackFactory {
    pub fn new(messages: Vec<String>) -> Self {
        Self {
            messages: Arc::new(messages),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn generator(&self) -> StaticFallback {
        StaticFallback {
            messages: Arc::clone(&self.messages),
            cursor: Arc::clone(&self.cursor),
        }
    }
}

impl GeneratorFactory for StaticFallbackFactory {
    fn build(&self, _provider: Arc<dyn AiProvider>) -> Box<dyn Generator> {
        Box::new(self.generator())
    }

    fn build_standalone(&self) -> Option<Box<dyn Generator>> {
        Some(Box::new(self.generator()))
    }
}
