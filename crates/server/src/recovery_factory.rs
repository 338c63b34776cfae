//! Wiring of the recovery engine from configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use mender_circuit::CircuitRegistry;
use mender_handlers::{
    AlertStore, HandlerRegistry, LogEscalationSink, MemoryAlertStore, MemoryMetrics,
    ProcSystemHealth, ReqwestHttpProbe, ScriptStepHandler, SystemctlStatusProbe,
};
use mender_orchestrator::{
    BackgroundProcessor, BackgroundProcessorBuilder, CircuitHealthMonitor, OrchestratorBuilder,
    OrchestratorMetrics, RecoveryOrchestrator,
};

use crate::config::MenderConfig;
use crate::error::ServerError;

/// Timeout for `http_response` success-condition probes.
const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// The assembled recovery engine and the collaborators it shares.
pub struct RecoveryRuntime {
    pub orchestrator: Arc<RecoveryOrchestrator>,
    pub alerts: Arc<dyn AlertStore>,
    pub metrics: Arc<MemoryMetrics>,
    pub escalations: Arc<LogEscalationSink>,
    pub circuits: Arc<CircuitRegistry>,
    pub counters: Arc<OrchestratorMetrics>,
}

/// Step handlers used by the server: scripts run for real, every other step
/// type is logged.
pub fn default_handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::logging();
    handlers.register(Arc::new(ScriptStepHandler::new()));
    handlers
}

/// Build the orchestrator described by `config` around `handlers`.
pub fn create_runtime(
    config: &MenderConfig,
    handlers: HandlerRegistry,
) -> Result<RecoveryRuntime, ServerError> {
    let catalog = config.validate()?;
    let alerts: Arc<dyn AlertStore> = Arc::new(MemoryAlertStore::new());
    let metrics = Arc::new(MemoryMetrics::new());
    let escalations = Arc::new(LogEscalationSink::new());
    let circuits = Arc::new(config.circuit_breaker.registry());
    let counters = Arc::new(OrchestratorMetrics::default());
    let http = ReqwestHttpProbe::new(HTTP_PROBE_TIMEOUT)
        .map_err(|e| ServerError::Config(format!("http probe: {e}")))?;

    let orchestrator = OrchestratorBuilder::new()
        .config(config.recovery.to_recovery_config())
        .catalog(catalog)
        .handlers(handlers)
        .metrics_source(metrics.clone())
        .metrics_sink(metrics.clone())
        .alert_store(Arc::clone(&alerts))
        .escalation_sink(escalations.clone())
        .http_probe(Arc::new(http))
        .service_status_probe(Arc::new(SystemctlStatusProbe))
        .circuits(Arc::clone(&circuits))
        .counters(Arc::clone(&counters))
        .build()?;

    info!(
        actions = orchestrator.actions().len(),
        enabled = orchestrator.is_enabled(),
        "recovery orchestrator ready"
    );

    Ok(RecoveryRuntime {
        orchestrator: Arc::new(orchestrator),
        alerts,
        metrics,
        escalations,
        circuits,
        counters,
    })
}

/// Build the background processor, or `None` when it is disabled.
pub fn create_background(
    config: &MenderConfig,
    runtime: &RecoveryRuntime,
) -> Result<Option<(BackgroundProcessor, mpsc::Sender<()>)>, ServerError> {
    if !config.background.enabled {
        return Ok(None);
    }

    let monitor = CircuitHealthMonitor::new(
        Arc::clone(&runtime.circuits),
        runtime.metrics.clone(),
        Arc::clone(&runtime.alerts),
    )
    .with_thresholds(config.health.to_thresholds())
    .with_counters(Arc::clone(&runtime.counters));

    let processor = BackgroundProcessorBuilder::new()
        .config(config.background.to_background_config())
        .orchestrator(Arc::clone(&runtime.orchestrator))
        .circuit_monitor(monitor)
        .system_health(Arc::new(ProcSystemHealth))
        .build()
        .map_err(|e| ServerError::Config(e.to_owned()))?;
    Ok(Some(processor))
}
