//! Background processor for periodic recovery tasks.
//!
//! The background processor handles:
//! - Re-dispatching active alerts that have no recovery attempt
//! - Draining the backpressure queue and self-checking the orchestrator
//! - Polling circuit health into metrics and alerts
//! - Recording system health and the recovery success rate
//! - Pruning old recovery history
//! - Running deployment checks

use std::sync::Arc;
use std::time::Duration;

use mender_handlers::{DeploymentMonitor, SystemHealthProbe};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::health::CircuitHealthMonitor;
use crate::orchestrator::RecoveryOrchestrator;

/// Configuration for the background processor.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct BackgroundConfig {
    /// How often to re-scan alerts and drain the queue (default: 30 seconds).
    pub recovery_check_interval: Duration,
    /// How often to poll circuit health (default: 30 seconds).
    pub circuit_poll_interval: Duration,
    /// How often to record system health (default: 60 seconds).
    pub health_check_interval: Duration,
    /// How often to run deployment checks (default: 120 seconds).
    pub deployment_check_interval: Duration,
    pub enable_recovery_checks: bool,
    pub enable_circuit_polling: bool,
    pub enable_health_checks: bool,
    pub enable_deployment_checks: bool,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            recovery_check_interval: Duration::from_secs(30),
            circuit_poll_interval: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            deployment_check_interval: Duration::from_secs(120),
            enable_recovery_checks: true,
            enable_circuit_polling: true,
            enable_health_checks: true,
            enable_deployment_checks: true,
        }
    }
}

/// Background processor for periodic orchestrator tasks.
pub struct BackgroundProcessor {
    config: BackgroundConfig,
    orchestrator: Arc<RecoveryOrchestrator>,
    circuit_monitor: Option<CircuitHealthMonitor>,
    system_health: Option<Arc<dyn SystemHealthProbe>>,
    deployments: Option<Arc<dyn DeploymentMonitor>>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BackgroundProcessor {
    /// Run the processor until a shutdown signal is received.
    pub async fn run(&mut self) {
        info!("background processor starting");

        let mut recovery_interval = interval(self.config.recovery_check_interval);
        let mut circuit_interval = interval(self.config.circuit_poll_interval);
        let mut health_interval = interval(self.config.health_check_interval);
        let mut deployment_interval = interval(self.config.deployment_check_interval);

        let poll_circuits = self.config.enable_circuit_polling && self.circuit_monitor.is_some();
        let check_deployments = self.config.enable_deployment_checks && self.deployments.is_some();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("background processor received shutdown signal");
                    break;
                }
                _ = recovery_interval.tick(), if self.config.enable_recovery_checks => {
                    self.run_recovery_checks().await;
                }
                _ = circuit_interval.tick(), if poll_circuits => {
                    self.poll_circuits().await;
                }
                _ = health_interval.tick(), if self.config.enable_health_checks => {
                    self.run_health_checks().await;
                }
                _ = deployment_interval.tick(), if check_deployments => {
                    self.check_deployments().await;
                }
            }
        }

        info!("background processor stopped");
    }

    async fn run_recovery_checks(&self) {
        if !self.orchestrator.is_enabled() {
            return;
        }
        if let Err(e) = self.orchestrator.monitor_active_alerts().await {
            error!(error = %e, "error monitoring active alerts");
        }
        self.orchestrator.process_queue();
        self.orchestrator.self_check();
    }

    async fn poll_circuits(&self) {
        let Some(monitor) = &self.circuit_monitor else {
            return;
        };
        if let Err(e) = monitor.poll().await {
            error!(error = %e, "error polling circuit health");
        }
    }

    async fn run_health_checks(&self) {
        if let Some(probe) = &self.system_health {
            match probe.snapshot().await {
                Ok(health) => self.orchestrator.record_system_health(health).await,
                Err(e) => error!(error = %e, "error reading system health"),
            }
        }
        let rate = self.orchestrator.record_success_rate().await;
        let pruned = self.orchestrator.prune_history();
        debug!(success_rate = rate, pruned, "health check complete");
    }

    async fn check_deployments(&self) {
        let Some(deployments) = &self.deployments else {
            return;
        };
        if let Err(e) = deployments.check_active_deployments().await {
            error!(error = %e, "error checking active deployments");
        }
        if let Err(e) = deployments.validate_deployment_health().await {
            error!(error = %e, "error validating deployment health");
        }
    }
}

/// Builder for creating a background processor.
pub struct BackgroundProcessorBuilder {
    config: BackgroundConfig,
    orchestrator: Option<Arc<RecoveryOrchestrator>>,
    circuit_monitor: Option<CircuitHealthMonitor>,
    system_health: Option<Arc<dyn SystemHealthProbe>>,
    deployments: Option<Arc<dyn DeploymentMonitor>>,
}

impl BackgroundProcessorBuilder {
    pub fn new() -> Self {
        Self {
            config: BackgroundConfig::default(),
            orchestrator: None,
            circuit_monitor: None,
            system_health: None,
            deployments: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: BackgroundConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn orchestrator(mut self, orchestrator: Arc<RecoveryOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    #[must_use]
    pub fn circuit_monitor(mut self, monitor: CircuitHealthMonitor) -> Self {
        self.circuit_monitor = Some(monitor);
        self
    }

    #[must_use]
    pub fn system_health(mut self, probe: Arc<dyn SystemHealthProbe>) -> Self {
        self.system_health = Some(probe);
        self
    }

    #[must_use]
    pub fn deployments(mut self, monitor: Arc<dyn DeploymentMonitor>) -> Self {
        self.deployments = Some(monitor);
        self
    }

    /// Build the processor and the sender that stops it.
    pub fn build(self) -> Result<(BackgroundProcessor, mpsc::Sender<()>), &'static str> {
        let orchestrator = self.orchestrator.ok_or("orchestrator is required")?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = BackgroundProcessor {
            config: self.config,
            orchestrator,
            circuit_monitor: self.circuit_monitor,
            system_health: self.system_health,
            deployments: self.deployments,
            shutdown_rx,
        };
        Ok((processor, shutdown_tx))
    }
}

impl Default for BackgroundProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mender_circuit::{CircuitBreakerConfig, CircuitRegistry};
    use mender_core::{
        Alert, AlertType, ComparisonOperator, MetricCategory, RecoveryAction, RecoveryConditions,
        RecoveryPhases, RecoveryStep, Severity, StepType,
    };
    use mender_handlers::{
        AlertStore, HandlerError, LogEscalationSink, MemoryAlertStore, MemoryMetrics,
        SystemHealth,
    };

    use super::*;
    use crate::builder::{OrchestratorBuilder, RecoveryConfig};
    use crate::catalog::RecoveryCatalog;

    struct FixedHealth;

    #[async_trait]
    impl SystemHealthProbe for FixedHealth {
        async fn snapshot(&self) -> Result<SystemHealth, HandlerError> {
            Ok(SystemHealth {
                cpu_load: 0.25,
                memory_percent: 40.0,
                disk_percent: 30.0,
            })
        }
    }

    #[derive(Default)]
    struct CountingDeployments {
        checks: AtomicUsize,
        validations: AtomicUsize,
    }

    #[async_trait]
    impl DeploymentMonitor for CountingDeployments {
        async fn check_active_deployments(&self) -> Result<(), HandlerError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn validate_deployment_health(&self) -> Result<(), HandlerError> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::Connection("deploy api unreachable".into()))
        }
    }

    fn fast_config() -> BackgroundConfig {
        BackgroundConfig {
            recovery_check_interval: Duration::from_millis(10),
            circuit_poll_interval: Duration::from_millis(10),
            health_check_interval: Duration::from_millis(10),
            deployment_check_interval: Duration::from_millis(10),
            ..BackgroundConfig::default()
        }
    }

    struct Setup {
        orchestrator: Arc<RecoveryOrchestrator>,
        metrics: Arc<MemoryMetrics>,
        alerts: Arc<MemoryAlertStore>,
        circuits: Arc<CircuitRegistry>,
    }

    fn clear_cache_action() -> RecoveryAction {
        RecoveryAction {
            id: "clear-cache".into(),
            name: "Clear cache".into(),
            description: String::new(),
            severity: Severity::High,
            conditions: RecoveryConditions::default(),
            actions: RecoveryPhases {
                immediate: vec![RecoveryStep::new(StepType::ClearCache, "application")],
                ..RecoveryPhases::default()
            },
            max_retries: 1,
            cooldown_period: 0,
            auto_execute: true,
            priority: 0,
        }
    }

    fn setup() -> Setup {
        let metrics = Arc::new(MemoryMetrics::new());
        let alerts = Arc::new(MemoryAlertStore::new());
        let circuits = Arc::new(CircuitRegistry::new(CircuitBreakerConfig::default()));
        let orchestrator = OrchestratorBuilder::new()
            .config(RecoveryConfig {
                global_cooldown: Duration::ZERO,
                settle_period: Duration::ZERO,
                ..RecoveryConfig::default()
            })
            .catalog(RecoveryCatalog::new())
            .action(clear_cache_action())
            .metrics_source(metrics.clone())
            .metrics_sink(metrics.clone())
            .alert_store(alerts.clone())
            .escalation_sink(Arc::new(LogEscalationSink::new()))
            .circuits(circuits.clone())
            .build()
            .unwrap();
        Setup {
            orchestrator: Arc::new(orchestrator),
            metrics,
            alerts,
            circuits,
        }
    }

    #[test]
    fn build_requires_orchestrator() {
        let result = BackgroundProcessorBuilder::new().build();
        assert_eq!(result.err(), Some("orchestrator is required"));
    }

    #[tokio::test]
    async fn processor_shuts_down_on_signal() {
        let s = setup();
        let (mut processor, shutdown_tx) = BackgroundProcessorBuilder::new()
            .config(fast_config())
            .orchestrator(s.orchestrator)
            .build()
            .unwrap();

        let handle = tokio::spawn(async move { processor.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "processor should stop after shutdown signal");
    }

    #[tokio::test]
    async fn recovery_checks_pick_up_stored_alerts() {
        let s = setup();
        s.metrics.set("memory_usage", 70.0);
        let alert = Alert::new("memory high", Severity::High, AlertType::Performance)
            .with_id("mem-1")
            .with_metric("memory_usage", 91.0, 85.0, ComparisonOperator::GreaterThan);
        s.alerts.save(alert).await.unwrap();

        let (mut processor, shutdown_tx) = BackgroundProcessorBuilder::new()
            .config(BackgroundConfig {
                enable_health_checks: false,
                ..fast_config()
            })
            .orchestrator(Arc::clone(&s.orchestrator))
            .build()
            .unwrap();
        let handle = tokio::spawn(async move { processor.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        s.orchestrator.shutdown().await;

        let history = s.orchestrator.history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action_id, "clear-cache");
        assert!(s.alerts.active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_and_circuit_loops_record_metrics() {
        let s = setup();
        let _ = s
            .circuits
            .execute("billing", "billing", || async { Ok::<_, String>(()) })
            .await;
        let deployments = Arc::new(CountingDeployments::default());
        let monitor =
            CircuitHealthMonitor::new(s.circuits.clone(), s.metrics.clone(), s.alerts.clone());

        let (mut processor, shutdown_tx) = BackgroundProcessorBuilder::new()
            .config(BackgroundConfig {
                enable_recovery_checks: false,
                ..fast_config()
            })
            .orchestrator(s.orchestrator)
            .circuit_monitor(monitor)
            .system_health(Arc::new(FixedHealth))
            .deployments(deployments.clone())
            .build()
            .unwrap();
        let handle = tokio::spawn(async move { processor.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!s.metrics.records_in(MetricCategory::System).is_empty());
        assert!(!s.metrics.records_in(MetricCategory::RecoverySuccess).is_empty());
        assert!(!s.metrics.records_in(MetricCategory::CircuitBreaker).is_empty());
        assert!(deployments.checks.load(Ordering::SeqCst) >= 1);
        assert_eq!(
            deployments.checks.load(Ordering::SeqCst),
            deployments.validations.load(Ordering::SeqCst)
        );
    }
}
