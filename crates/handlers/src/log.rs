use mender_core::{RecoveryStep, StepType};
use tracing::info;

use crate::error::HandlerError;
use crate::handler::{StepHandler, StepOutput};

/// A handler that logs the step and reports success without touching
/// anything.
///
/// Useful for dry runs and local development where no real remediation
/// backend is wired up.
pub struct LogStepHandler {
    step_type: StepType,
}

impl LogStepHandler {
    pub fn new(step_type: StepType) -> Self {
        Self { step_type }
    }
}

impl StepHandler for LogStepHandler {
    fn step_type(&self) -> StepType {
        self.step_type
    }

    #[allow(clippy::unused_async)]
    async fn execute(&self, step: &RecoveryStep) -> Result<StepOutput, HandlerError> {
        info!(
            step_type = %step.step_type,
            target = %step.target,
            parameters = %serde_json::Value::Object(step.parameters.clone()),
            "log handler executed recovery step"
        );
        Ok(StepOutput::text(format!(
            "{} {} (logged)",
            step.step_type, step.target
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_handler_succeeds() {
        let handler = LogStepHandler::new(StepType::NotifyTeam);
        assert_eq!(StepHandler::step_type(&handler), StepType::NotifyTeam);

        let step = RecoveryStep::new(StepType::NotifyTeam, "ops-team").param("priority", "high");
        let out = StepHandler::execute(&handler, &step).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("notify_team ops-team (logged)"));
    }
}
