use async_trait::async_trait;
use mender_core::{RecoveryStep, StepType};

use crate::error::HandlerError;

/// What a step handler reports back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub output: Option<String>,
}

impl StepOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
        }
    }
}

/// Executes one kind of recovery step.
///
/// Not object-safe because it uses native `async fn`. Implement this and use
/// the blanket [`DynStepHandler`] implementation for dynamic dispatch.
pub trait StepHandler: Send + Sync {
    /// The step type this handler serves.
    fn step_type(&self) -> StepType;

    /// Carry out `step`. Returning `Err` marks the step failed.
    fn execute(
        &self,
        step: &RecoveryStep,
    ) -> impl std::future::Future<Output = Result<StepOutput, HandlerError>> + Send;
}

/// Object-safe handler trait for use behind `Arc<dyn DynStepHandler>`.
#[async_trait]
pub trait DynStepHandler: Send + Sync {
    fn step_type(&self) -> StepType;

    async fn execute(&self, step: &RecoveryStep) -> Result<StepOutput, HandlerError>;
}

#[async_trait]
impl<T: StepHandler + Sync> DynStepHandler for T {
    fn step_type(&self) -> StepType {
        StepHandler::step_type(self)
    }

    async fn execute(&self, step: &RecoveryStep) -> Result<StepOutput, HandlerError> {
        StepHandler::execute(self, step).await
    }
}
