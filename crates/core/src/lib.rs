pub mod alert;
pub mod attempt;
pub mod condition;
pub mod error;
pub mod escalation;
pub mod metric;
pub mod recovery;
pub mod stats;

pub use alert::{Alert, AlertStatus, AlertType, ComparisonOperator, Severity};
pub use attempt::{AttemptResult, AttemptStatus, RecoveryAttempt, StepExecution, StepStatus};
pub use condition::{MetricOp, SuccessCondition};
pub use error::CoreError;
pub use escalation::{EscalationLevel, EscalationReason, EscalationRequest, Urgency};
pub use metric::{MetricCategory, MetricRecord};
pub use recovery::{
    DEFAULT_STEP_TIMEOUT, Phase, RecoveryAction, RecoveryActionUpdate, RecoveryConditions,
    RecoveryPhases, RecoveryStep, StepType,
};
pub use stats::{HealthState, IssueStats, OrchestratorStatus, RecoveryStats, TOP_ISSUES};
