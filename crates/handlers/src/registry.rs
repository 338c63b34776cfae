use std::collections::HashMap;
use std::sync::Arc;

use mender_core::StepType;

use crate::handler::DynStepHandler;
use crate::log::LogStepHandler;

/// Maps each step type to the handler that executes it.
///
/// Built once at startup and then shared immutably.
pub struct HandlerRegistry {
    handlers: HashMap<StepType, Arc<dyn DynStepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry where every step type is served by a [`LogStepHandler`].
    pub fn logging() -> Self {
        let mut registry = Self::new();
        for step_type in StepType::ALL {
            registry.register(Arc::new(LogStepHandler::new(step_type)));
        }
        registry
    }

    /// Register a handler under its own step type, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn DynStepHandler>) {
        self.handlers.insert(handler.step_type(), handler);
    }

    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn DynStepHandler>> {
        self.handlers.get(&step_type).cloned()
    }

    /// Step types among `required` that have no handler, sorted and deduplicated.
    pub fn missing(&self, required: impl IntoIterator<Item = StepType>) -> Vec<StepType> {
        let mut missing: Vec<StepType> = required
            .into_iter()
            .filter(|t| !self.handlers.contains_key(t))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Sorted list of step types with a handler.
    pub fn step_types(&self) -> Vec<StepType> {
        let mut types: Vec<StepType> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("step_types", &self.step_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use mender_core::RecoveryStep;

    use super::*;
    use crate::error::HandlerError;
    use crate::handler::{StepHandler, StepOutput};

    struct FailingRestart;

    impl StepHandler for FailingRestart {
        fn step_type(&self) -> StepType {
            StepType::RestartService
        }

        async fn execute(&self, step: &RecoveryStep) -> Result<StepOutput, HandlerError> {
            Err(HandlerError::ExecutionFailed(format!(
                "{} refused to restart",
                step.target
            )))
        }
    }

    #[test]
    fn empty_registry() {
        let reg = HandlerRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(
            reg.missing([StepType::ClearCache, StepType::ClearCache]),
            vec![StepType::ClearCache]
        );
    }

    #[test]
    fn logging_registry_covers_every_step_type() {
        let reg = HandlerRegistry::logging();
        assert_eq!(reg.len(), StepType::ALL.len());
        assert!(reg.missing(StepType::ALL).is_empty());
    }

    #[tokio::test]
    async fn register_replaces_by_step_type() {
        let mut reg = HandlerRegistry::logging();
        reg.register(Arc::new(FailingRestart));
        assert_eq!(reg.len(), StepType::ALL.len());

        let handler = reg.get(StepType::RestartService).unwrap();
        let err = handler
            .execute(&RecoveryStep::new(StepType::RestartService, "api-server"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("api-server"));
    }
}
