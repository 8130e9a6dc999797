//! Tool-augmented generation as a decorator over any generator factory.

use crate::content::GeneratedContent;
use crate::error::ProviderError;
use crate::generator::{GenerationContext, Generator, GeneratorFactory};
use crate::provider::{AiProvider, ToolSpec};
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps a factory so every generator it builds sees extra tool specs in its context.
pub struct WithTools {
    inner: Arc<dyn GeneratorFactory>,
    tools: Arc<Vec<ToolSpec>>,
}

impl WithTools {
    pub fn new(inner: Arc<dyn GeneratorFactory>, tools: Vec<ToolSpec>) -> Self {
        Self {
            inner,
            tools: Arc::new(tools),
        }
    }
}

struct ToolGenerator {
    inner: Box<dyn Generator>,
    tools: Arc<Vec<ToolSpec>>,
}

#[async_trait]
impl Generator for ToolGenerator {
    async fn generate(
        &self,
        context: &GenerationContext,
    ) -> Result<GeneratedContent, ProviderError> {
        let mut context = context.clone();
        for tool in self.tools.iter() {
            if !context.tools.iter().any(|existing| existing.name == tool.name) {
                context.tools.push(tool.clone());
            }
        }
        self.inner.generate(&context).await
    }
}

impl GeneratorFactory for WithTools {
    fn build(&self, provider: Arc<dyn AiProvider>) -> Box<dyn Generator> {
        Box::new(ToolGenerator {
            inner: self.inner.build(provider),
            tools: Arc::clone(&self.tools),
        })
    }

    fn build_standalone(&self) -> Option<Box<dyn Generator>> {
        let inner = self.inner.build_standalone()?;
        Some(Box::new(ToolGenerator {
            inner,
            tools: Arc::clone(&self.tools),
        }))
    }
}
