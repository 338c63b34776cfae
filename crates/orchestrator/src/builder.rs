use std::sync::Arc;
use std::time::Duration;

use mender_circuit::{CircuitBreakerConfig, CircuitRegistry};
use mender_core::RecoveryAction;
use mender_handlers::{
    AlertStore, EscalationSink, HandlerRegistry, HttpProbe, MemoryMetrics, MetricsSink,
    MetricsSource, ServiceStatusProbe,
};
use parking_lot::{Mutex, RwLock};
use tokio_util::task::TaskTracker;

use crate::catalog::RecoveryCatalog;
use crate::conditions::ConditionEvaluator;
use crate::error::OrchestratorError;
use crate::metrics::OrchestratorMetrics;
use crate::orchestrator::{RecoveryOrchestrator, RecoveryState, missing_handlers};

/// Tunables for the recovery orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Whether automated recovery starts switched on.
    pub enabled: bool,
    /// Upper bound on attempts executing at once.
    pub max_concurrent_recoveries: usize,
    /// Minimum gap between the starts of any two attempts. Zero disables it.
    pub global_cooldown: Duration,
    /// Wait between the last successful step and re-checking the alert metric.
    pub settle_period: Duration,
    /// Finished attempts kept in memory.
    pub history_limit: usize,
    /// Age after which finished attempts are pruned.
    pub history_retention: Duration,
    /// Capacity of the backpressure queue.
    pub max_queued_alerts: usize,
    /// Route every step call through a per-target circuit breaker.
    pub guard_steps_with_circuits: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_recoveries: 5,
            global_cooldown: Duration::from_secs(300),
            settle_period: Duration::from_secs(10),
            history_limit: 1000,
            history_retention: Duration::from_secs(7 * 24 * 60 * 60),
            max_queued_alerts: 100,
            guard_steps_with_circuits: true,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_recoveries < 1 {
            return Err("max_concurrent_recoveries must be >= 1".into());
        }
        if self.history_limit < 1 {
            return Err("history_limit must be >= 1".into());
        }
        Ok(())
    }
}

/// Fluent builder for a [`RecoveryOrchestrator`].
///
/// An [`AlertStore`] and an [`EscalationSink`] must be supplied. Everything
/// else defaults: the built-in playbooks, log-only step handlers, an
/// in-memory metrics store and a fresh circuit registry.
pub struct OrchestratorBuilder {
    config: RecoveryConfig,
    catalog: Option<RecoveryCatalog>,
    extra_actions: Vec<RecoveryAction>,
    handlers: Option<HandlerRegistry>,
    metrics_source: Option<Arc<dyn MetricsSource>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    alerts: Option<Arc<dyn AlertStore>>,
    escalation: Option<Arc<dyn EscalationSink>>,
    http: Option<Arc<dyn HttpProbe>>,
    services: Option<Arc<dyn ServiceStatusProbe>>,
    circuits: Option<Arc<CircuitRegistry>>,
    counters: Option<Arc<OrchestratorMetrics>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RecoveryConfig::default(),
            catalog: None,
            extra_actions: Vec::new(),
            handlers: None,
            metrics_source: None,
            metrics_sink: None,
            alerts: None,
            escalation: None,
            http: None,
            services: None,
            circuits: None,
            counters: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: RecoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in playbooks.
    #[must_use]
    pub fn catalog(mut self, catalog: RecoveryCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Register one more playbook on top of the catalog.
    #[must_use]
    pub fn action(mut self, action: RecoveryAction) -> Self {
        self.extra_actions.push(action);
        self
    }

    #[must_use]
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    #[must_use]
    pub fn metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = Some(source);
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn alert_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.alerts = Some(store);
        self
    }

    #[must_use]
    pub fn escalation_sink(mut self, sink: Arc<dyn EscalationSink>) -> Self {
        self.escalation = Some(sink);
        self
    }

    #[must_use]
    pub fn http_probe(mut self, probe: Arc<dyn HttpProbe>) -> Self {
        self.http = Some(probe);
        self
    }

    #[must_use]
    pub fn service_status_probe(mut self, probe: Arc<dyn ServiceStatusProbe>) -> Self {
        self.services = Some(probe);
        self
    }

    /// Share a circuit registry with other components.
    #[must_use]
    pub fn circuits(mut self, registry: Arc<CircuitRegistry>) -> Self {
        self.circuits = Some(registry);
        self
    }

    /// Share counters with the circuit health monitor.
    #[must_use]
    pub fn counters(mut self, counters: Arc<OrchestratorMetrics>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Consume the builder and produce a configured [`RecoveryOrchestrator`].
    ///
    /// Fails with [`OrchestratorError::Configuration`] when a required
    /// collaborator is missing, the config is invalid, or a playbook uses a
    /// step type with no registered handler.
    pub fn build(self) -> Result<RecoveryOrchestrator, OrchestratorError> {
        let alerts = self
            .alerts
            .ok_or_else(|| OrchestratorError::Configuration("alert store is required".into()))?;
        let escalation = self.escalation.ok_or_else(|| {
            OrchestratorError::Configuration("escalation sink is required".into())
        })?;
        self.config
            .validate()
            .map_err(OrchestratorError::Configuration)?;

        let mut catalog = self.catalog.unwrap_or_else(RecoveryCatalog::with_defaults);
        for action in self.extra_actions {
            catalog.add(action)?;
        }

        let handlers = self.handlers.unwrap_or_else(HandlerRegistry::logging);
        let missing = handlers.missing(catalog.step_types());
        if !missing.is_empty() {
            return Err(OrchestratorError::Configuration(missing_handlers(&missing)));
        }

        let memory = Arc::new(MemoryMetrics::new());
        let metrics_source = self
            .metrics_source
            .unwrap_or_else(|| Arc::clone(&memory) as Arc<dyn MetricsSource>);
        let metrics_sink = self.metrics_sink.unwrap_or(memory);

        let mut conditions = ConditionEvaluator::new(Arc::clone(&metrics_source));
        if let Some(http) = self.http {
            conditions = conditions.with_http(http);
        }
        if let Some(services) = self.services {
            conditions = conditions.with_service_status(services);
        }

        let enabled = self.config.enabled;
        Ok(RecoveryOrchestrator {
            config: self.config,
            catalog: RwLock::new(catalog),
            handlers,
            conditions,
            metrics_source,
            metrics_sink,
            alerts,
            escalation,
            circuits: self
                .circuits
                .unwrap_or_else(|| Arc::new(CircuitRegistry::new(CircuitBreakerConfig::default()))),
            state: Arc::new(Mutex::new(RecoveryState::new(enabled))),
            counters: self.counters.unwrap_or_default(),
            tracker: TaskTracker::new(),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use mender_core::{RecoveryStep, StepType};
    use mender_handlers::{LogEscalationSink, LogStepHandler, MemoryAlertStore};

    use super::*;

    fn required() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .alert_store(Arc::new(MemoryAlertStore::new()))
            .escalation_sink(Arc::new(LogEscalationSink::new()))
    }

    #[test]
    fn build_missing_alert_store_returns_error() {
        let result = OrchestratorBuilder::new()
            .escalation_sink(Arc::new(LogEscalationSink::new()))
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("alert store is required"));
    }

    #[test]
    fn build_missing_escalation_sink_returns_error() {
        let result = OrchestratorBuilder::new()
            .alert_store(Arc::new(MemoryAlertStore::new()))
            .build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("escalation sink is required"));
    }

    #[test]
    fn build_with_required_fields_loads_default_playbooks() {
        let orchestrator = required().build().unwrap();
        assert_eq!(orchestrator.actions().len(), 5);
        assert!(orchestrator.is_enabled());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = required()
            .config(RecoveryConfig {
                max_concurrent_recoveries: 0,
                ..RecoveryConfig::default()
            })
            .build();
        assert!(result.unwrap_err().to_string().contains("max_concurrent_recoveries"));
    }

    #[test]
    fn build_rejects_playbooks_without_handlers() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(Arc::new(LogStepHandler::new(StepType::RestartService)));
        let err = required().handlers(handlers).build().unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
        assert!(err.to_string().contains("clear_cache"));
    }

    #[test]
    fn build_adds_extra_actions() {
        let mut action = crate::catalog::default_actions().remove(0);
        action.id = "custom".into();
        action.actions.immediate = vec![RecoveryStep::new(StepType::ClearCache, "redis")];
        let orchestrator = required().action(action).build().unwrap();
        assert_eq!(orchestrator.actions().len(), 6);
        assert!(orchestrator.action("custom").is_some());
    }

    #[test]
    fn build_rejects_duplicate_extra_action() {
        let action = crate::catalog::default_actions().remove(0);
        let err = required().action(action).build().unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn disabled_config_starts_disabled() {
        let orchestrator = required()
            .config(RecoveryConfig {
                enabled: false,
                ..RecoveryConfig::default()
            })
            .build()
            .unwrap();
        assert!(!orchestrator.is_enabled());
    }
}
