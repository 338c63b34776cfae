pub mod alerts;
pub mod error;
pub mod escalation;
pub mod handler;
pub mod log;
pub mod metrics;
pub mod probes;
pub mod registry;
pub mod script;

#[cfg(feature = "http")]
pub mod http;

pub use alerts::{AlertStore, MemoryAlertStore};
pub use error::HandlerError;
pub use escalation::{EscalationSink, LogEscalationSink};
pub use handler::{DynStepHandler, StepHandler, StepOutput};
pub use log::LogStepHandler;
pub use metrics::{MemoryMetrics, MetricsSink, MetricsSource};
pub use probes::{
    DeploymentMonitor, HttpProbe, ProcSystemHealth, ServiceStatusProbe, StaticServiceStatus,
    SystemHealth, SystemHealthProbe, SystemctlStatusProbe,
};
pub use registry::HandlerRegistry;
pub use script::ScriptStepHandler;

#[cfg(feature = "http")]
pub use http::ReqwestHttpProbe;
