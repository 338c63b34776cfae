pub mod background;
pub mod builder;
pub mod catalog;
pub mod conditions;
pub mod error;
pub mod health;
pub mod metrics;
pub mod orchestrator;

pub use background::{BackgroundConfig, BackgroundProcessor, BackgroundProcessorBuilder};
pub use builder::{OrchestratorBuilder, RecoveryConfig};
pub use catalog::{RecoveryCatalog, default_actions};
pub use conditions::ConditionEvaluator;
pub use error::{CatalogError, OrchestratorError};
pub use health::{CircuitHealthMonitor, HealthThresholds};
pub use metrics::{MetricsSnapshot, OrchestratorMetrics};
pub use orchestrator::{AlertDisposition, DEFAULT_HISTORY_LIMIT, RESOLVED_BY, RecoveryOrchestrator};
