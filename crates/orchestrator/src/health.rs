use std::sync::Arc;
use std::time::Duration;

use mender_circuit::{CircuitRegistry, CircuitState, CircuitStats};
use mender_core::{Alert, AlertType, ComparisonOperator, MetricCategory, MetricRecord, Severity};
use mender_handlers::{AlertStore, MetricsSink};
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::metrics::OrchestratorMetrics;

const SOURCE: &str = "circuit-breaker";

/// Limits above which a circuit raises an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    /// Error rate, in percent.
    pub error_rate_ceiling: f64,
    /// Requests a circuit must have seen before its error rate counts.
    pub min_request_volume: u64,
    pub response_time_ceiling: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            error_rate_ceiling: 50.0,
            min_request_volume: 10,
            response_time_ceiling: Duration::from_secs(5),
        }
    }
}

/// Turns circuit statistics into metrics and alerts.
///
/// Alerts are deduplicated by fingerprint: a condition that is already open
/// bumps the existing alert's occurrence count instead of raising another.
pub struct CircuitHealthMonitor {
    circuits: Arc<CircuitRegistry>,
    sink: Arc<dyn MetricsSink>,
    alerts: Arc<dyn AlertStore>,
    thresholds: HealthThresholds,
    counters: Option<Arc<OrchestratorMetrics>>,
}

impl CircuitHealthMonitor {
    pub fn new(
        circuits: Arc<CircuitRegistry>,
        sink: Arc<dyn MetricsSink>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        Self {
            circuits,
            sink,
            alerts,
            thresholds: HealthThresholds::default(),
            counters: None,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_counters(mut self, counters: Arc<OrchestratorMetrics>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Record metrics for every circuit and raise alerts for unhealthy ones.
    /// Returns the number of alerts raised or re-observed.
    pub async fn poll(&self) -> Result<usize, OrchestratorError> {
        let mut raised = 0;
        for stats in self.circuits.all_stats() {
            self.record_metrics(&stats).await;
            for alert in self.evaluate(&stats) {
                self.raise(alert).await?;
                raised += 1;
            }
        }
        if raised > 0 {
            debug!(raised, "circuit health poll raised alerts");
        }
        Ok(raised)
    }

    async fn record_metrics(&self, stats: &CircuitStats) {
        let records = [
            MetricRecord::new(
                MetricCategory::CircuitBreaker,
                format!("circuit_state.{}", stats.id),
                state_value(stats.state),
                "state",
            ),
            MetricRecord::new(
                MetricCategory::CircuitBreaker,
                format!("circuit_error_rate.{}", stats.id),
                stats.error_rate,
                "%",
            ),
            MetricRecord::new(
                MetricCategory::CircuitBreaker,
                format!("circuit_response_time.{}", stats.id),
                stats.average_response_time_ms,
                "ms",
            ),
        ];
        for record in records {
            self.sink
                .record(
                    record
                        .with_source(SOURCE)
                        .with_meta("service", stats.service_name.clone()),
                )
                .await;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, stats: &CircuitStats) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if stats.state == CircuitState::Open {
            alerts.push(
                Alert::new(
                    format!("Circuit breaker open: {}", stats.service_name),
                    Severity::High,
                    AlertType::System,
                )
                .with_source(SOURCE)
                .with_fingerprint(format!("circuit-open:{}", stats.id))
                .with_metric(
                    format!("circuit_state.{}", stats.id),
                    state_value(stats.state),
                    state_value(CircuitState::HalfOpen),
                    ComparisonOperator::GreaterThan,
                ),
            );
        }

        if stats.total_requests >= self.thresholds.min_request_volume
            && stats.error_rate > self.thresholds.error_rate_ceiling
        {
            alerts.push(
                Alert::new(
                    format!("High error rate: {}", stats.service_name),
                    Severity::High,
                    AlertType::Performance,
                )
                .with_source(SOURCE)
                .with_fingerprint(format!("circuit-error-rate:{}", stats.id))
                .with_metric(
                    format!("circuit_error_rate.{}", stats.id),
                    stats.error_rate,
                    self.thresholds.error_rate_ceiling,
                    ComparisonOperator::GreaterThan,
                ),
            );
        }

        let ceiling_ms = self.thresholds.response_time_ceiling.as_millis() as f64;
        if stats.recent_calls > 0 && stats.average_response_time_ms > ceiling_ms {
            alerts.push(
                Alert::new(
                    format!("Slow responses: {}", stats.service_name),
                    Severity::Medium,
                    AlertType::Performance,
                )
                .with_source(SOURCE)
                .with_fingerprint(format!("circuit-response-time:{}", stats.id))
                .with_metric(
                    format!("circuit_response_time.{}", stats.id),
                    stats.average_response_time_ms,
                    ceiling_ms,
                    ComparisonOperator::GreaterThan,
                ),
            );
        }

        alerts
    }

    async fn raise(&self, alert: Alert) -> Result<(), OrchestratorError> {
        let store = |e: mender_handlers::HandlerError| OrchestratorError::Store(e.to_string());
        let Some(fingerprint) = alert.fingerprint.as_deref() else {
            return Ok(());
        };

        if let Some(existing) = self
            .alerts
            .find_open_by_fingerprint(fingerprint)
            .await
            .map_err(store)?
        {
            self.alerts
                .record_occurrence(&existing.id, alert.current_value)
                .await
                .map_err(store)?;
            debug!(alert.id = %existing.id, fingerprint, "circuit alert re-observed");
        } else {
            warn!(alert.id = %alert.id, fingerprint, title = %alert.title, "raising circuit alert");
            self.alerts.save(alert).await.map_err(store)?;
        }

        if let Some(counters) = &self.counters {
            counters.increment_circuit_alerts();
        }
        Ok(())
    }
}

impl std::fmt::Debug for CircuitHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitHealthMonitor")
            .field("circuits", &self.circuits.len())
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

/// Numeric encoding used for the `circuit_state.*` metric.
pub fn state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

#[cfg(test)]
mod tests {
    use mender_circuit::CircuitBreakerConfig;
    use mender_handlers::{MemoryAlertStore, MemoryMetrics};

    use super::*;

    struct Fixture {
        circuits: Arc<CircuitRegistry>,
        metrics: Arc<MemoryMetrics>,
        alerts: Arc<MemoryAlertStore>,
        counters: Arc<OrchestratorMetrics>,
        monitor: CircuitHealthMonitor,
    }

    fn fixture() -> Fixture {
        let circuits = Arc::new(CircuitRegistry::new(CircuitBreakerConfig::default()));
        let metrics = Arc::new(MemoryMetrics::new());
        let alerts = Arc::new(MemoryAlertStore::new());
        let counters = Arc::new(OrchestratorMetrics::default());
        let monitor = CircuitHealthMonitor::new(circuits.clone(), metrics.clone(), alerts.clone())
            .with_counters(counters.clone());
        Fixture {
            circuits,
            metrics,
            alerts,
            counters,
            monitor,
        }
    }

    async fn call(circuits: &CircuitRegistry, id: &str, ok: bool) {
        let _ = circuits
            .execute(id, "payments", || async move {
                if ok { Ok(()) } else { Err("boom".to_string()) }
            })
            .await;
    }

    #[tokio::test]
    async fn healthy_circuits_only_record_metrics() {
        let f = fixture();
        call(&f.circuits, "payments-api", true).await;

        assert_eq!(f.monitor.poll().await.unwrap(), 0);
        let records = f.metrics.records_in(MetricCategory::CircuitBreaker);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "circuit_state.payments-api");
        assert!(records[0].value.abs() < f64::EPSILON);
        assert!(f.alerts.is_empty());
    }

    #[tokio::test]
    async fn open_circuit_raises_one_deduplicated_alert() {
        let f = fixture();
        call(&f.circuits, "payments-api", true).await;
        assert!(f.circuits.force_open("payments-api"));

        assert_eq!(f.monitor.poll().await.unwrap(), 1);
        assert_eq!(f.monitor.poll().await.unwrap(), 1);

        let active = f.alerts.active_alerts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, Severity::High);
        assert_eq!(active[0].occurrence_count, 2);
        assert_eq!(active[0].metric_name.as_deref(), Some("circuit_state.payments-api"));
        assert_eq!(f.counters.snapshot().circuit_alerts, 2);
    }

    #[tokio::test]
    async fn high_error_rate_needs_request_volume() {
        let f = fixture();
        for _ in 0..4 {
            call(&f.circuits, "search", false).await;
        }
        // Four failures: below both the failure threshold and the volume floor.
        assert_eq!(f.monitor.poll().await.unwrap(), 0);

        let monitor =
            CircuitHealthMonitor::new(f.circuits.clone(), f.metrics.clone(), f.alerts.clone())
                .with_thresholds(HealthThresholds {
                    min_request_volume: 2,
                    ..HealthThresholds::default()
                });
        assert_eq!(monitor.poll().await.unwrap(), 1);
        let active = f.alerts.active_alerts().await.unwrap();
        assert_eq!(active[0].alert_type, AlertType::Performance);
        assert_eq!(active[0].fingerprint.as_deref(), Some("circuit-error-rate:search"));
    }

    #[test]
    fn state_encoding() {
        assert!(state_value(CircuitState::Closed) < state_value(CircuitState::HalfOpen));
        assert!(state_value(CircuitState::HalfOpen) < state_value(CircuitState::Open));
    }
}
