//! Step trait and the per-variant step registry.
//!
//! Steps are dispatched through a registry keyed by [`StepName`] rather than
//! name matching in the coordinator. A step receives the shared
//! [`StepContext`], reads earlier steps' data from state, and returns its
//! typed output; the coordinator owns all status bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use slidecast_core::{StepData, StepName};

use crate::context::StepContext;
use crate::error::PipelineResult;
use crate::steps;

/// What a successful step hands back to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Typed payload recorded on the step snapshot.
    pub data: StepData,
    /// Rendered transcript markdown, when the step produces one.
    pub markdown: Option<String>,
}

impl StepOutput {
    /// Output with data only.
    #[must_use]
    pub const fn data(data: StepData) -> Self {
        Self {
            data,
            markdown: None,
        }
    }

    /// Output with data and markdown.
    #[must_use]
    pub fn with_markdown(data: StepData, markdown: String) -> Self {
        Self {
            data,
            markdown: Some(markdown),
        }
    }
}

/// One pluggable pipeline step.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Stable step identifier.
    fn name(&self) -> StepName;

    /// Execute the step. Long-running implementations must poll
    /// `ctx.check_cancelled()` at unit boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PipelineError::Cancelled`] when the probe fires, or
    /// any other pipeline error on failure.
    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput>;
}

/// Registry mapping step names to implementations.
#[derive(Clone, Default)]
pub struct StepRegistry {
    map: HashMap<StepName, Arc<dyn PipelineStep>>,
}

impl StepRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in step registered.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for step in steps::all_steps() {
            registry.register(step);
        }
        registry
    }

    /// Register (or replace) a step implementation.
    pub fn register(&mut self, step: Arc<dyn PipelineStep>) {
        self.map.insert(step.name(), step);
    }

    /// Look up the implementation for a step.
    #[must_use]
    pub fn get(&self, name: StepName) -> Option<Arc<dyn PipelineStep>> {
        self.map.get(&name).cloned()
    }

    /// Registered step names.
    #[must_use]
    pub fn names(&self) -> Vec<StepName> {
        let mut names: Vec<StepName> = self.map.keys().copied().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_plannable_step() {
        let registry = StepRegistry::standard();
        for step in slidecast_core::ALL_STEPS.iter().copied() {
            assert!(
                registry.get(step).is_some(),
                "step {step} has no implementation"
            );
        }
    }
}
