//! Generator registry and dispatch

use std::collections::BTreeMap;

use crate::context::{GenerationContext, OutputMap, StackGenerator};
use crate::error::{Error, Result};
use crate::generator::{JAVA_SPRING_JPA, JavaSpringJpaGenerator};

/// Stack id → generator
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Box<dyn StackGenerator>>,
}

impl GeneratorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in generator
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(JAVA_SPRING_JPA, JavaSpringJpaGenerator::default());
        registry
    }

    /// Register `generator` for `stack_id`, replacing any previous one
    pub fn register(&mut self, stack_id: impl Into<String>, generator: impl StackGenerator + 'static) {
        self.generators.insert(stack_id.into(), Box::new(generator));
    }

    /// Look up a generator
    pub fn get(&self, stack_id: &str) -> Option<&dyn StackGenerator> {
        self.generators.get(stack_id).map(|g| g.as_ref())
    }

    /// Sorted registered stack ids
    pub fn ids(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("stacks", &self.ids())
            .finish()
    }
}

/// Dispatch `context` to the generator registered for its stack
pub fn run_generation_pipeline(
    context: &GenerationContext,
    registry: &GeneratorRegistry,
) -> Result<OutputMap> {
    let generator = registry
        .get(&context.stack_id)
        .ok_or_else(|| Error::StackNotImplemented {
            stack_id: context.stack_id.clone(),
            implemented: registry.ids(),
        })?;

    tracing::info!(stack = %context.stack_id, targets = ?context.targets, "Running generator");
    let outputs = generator.generate(context)?;
    tracing::debug!(files = outputs.len(), "Generator finished");
    Ok(outputs)
}
