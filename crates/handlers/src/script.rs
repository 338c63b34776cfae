use mender_core::{RecoveryStep, StepType};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::handler::{StepHandler, StepOutput};

/// Runs `execute_script` steps as `<interpreter> <target> <parameters as JSON>`.
///
/// The script fails if it exits non-zero or writes anything to stderr.
/// Standard output becomes the step output.
pub struct ScriptStepHandler {
    interpreter: String,
}

impl ScriptStepHandler {
    pub fn new() -> Self {
        Self {
            interpreter: "bash".into(),
        }
    }

    /// Use a different interpreter (e.g. `sh`).
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }
}

impl Default for ScriptStepHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl StepHandler for ScriptStepHandler {
    fn step_type(&self) -> StepType {
        StepType::ExecuteScript
    }

    async fn execute(&self, step: &RecoveryStep) -> Result<StepOutput, HandlerError> {
        if step.target.trim().is_empty() {
            return Err(HandlerError::Configuration("script path is empty".into()));
        }
        let args = serde_json::Value::Object(step.parameters.clone()).to_string();
        debug!(interpreter = %self.interpreter, script = %step.target, "running recovery script");

        let output = Command::new(&self.interpreter)
            .arg(&step.target)
            .arg(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HandlerError::Connection(format!("failed to spawn script: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(
                script = %step.target,
                stderr = %stderr.trim(),
                "recovery script wrote to stderr"
            );
            return Err(HandlerError::ExecutionFailed(format!(
                "script execution failed: {}",
                stderr.trim()
            )));
        }
        if !output.status.success() {
            return Err(HandlerError::ExecutionFailed(format!(
                "script exited with {}",
                output.status
            )));
        }

        Ok(StepOutput::text(String::from_utf8_lossy(&output.stdout).trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn script(body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "mender-script-{}-{}.sh",
            std::process::id(),
            body.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn step(path: &std::path::Path) -> RecoveryStep {
        RecoveryStep::new(StepType::ExecuteScript, path.to_string_lossy())
            .param("cleanTmp", true)
    }

    #[tokio::test]
    async fn stdout_becomes_output_and_params_are_passed() {
        let path = script("echo \"cleaned $1\"\n");
        let handler = ScriptStepHandler::new().with_interpreter("sh");
        let out = StepHandler::execute(&handler, &step(&path)).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("cleaned {\"cleanTmp\":true}"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn stderr_fails_the_step() {
        let path = script("echo 'disk still full' >&2\n");
        let handler = ScriptStepHandler::new().with_interpreter("sh");
        let err = StepHandler::execute(&handler, &step(&path)).await.unwrap_err();
        assert!(err.to_string().contains("disk still full"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn non_zero_exit_fails_the_step() {
        let path = script("exit 3\n");
        let handler = ScriptStepHandler::new().with_interpreter("sh");
        let err = StepHandler::execute(&handler, &step(&path)).await.unwrap_err();
        assert!(matches!(err, HandlerError::ExecutionFailed(_)));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn empty_target_is_a_configuration_error() {
        let handler = ScriptStepHandler::new();
        let err = StepHandler::execute(&handler, &RecoveryStep::new(StepType::ExecuteScript, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Configuration(_)));
    }
}
