use std::sync::Arc;

use mender_core::SuccessCondition;
use mender_handlers::{HttpProbe, MetricsSource, ServiceStatusProbe};
use tracing::{debug, warn};

/// Evaluates step success conditions against the configured probes.
///
/// A condition whose probe is not configured, or whose probe fails, is not
/// satisfied.
#[derive(Clone)]
pub struct ConditionEvaluator {
    metrics: Arc<dyn MetricsSource>,
    http: Option<Arc<dyn HttpProbe>>,
    services: Option<Arc<dyn ServiceStatusProbe>>,
}

impl ConditionEvaluator {
    pub fn new(metrics: Arc<dyn MetricsSource>) -> Self {
        Self {
            metrics,
            http: None,
            services: None,
        }
    }

    #[must_use]
    pub fn with_http(mut self, probe: Arc<dyn HttpProbe>) -> Self {
        self.http = Some(probe);
        self
    }

    #[must_use]
    pub fn with_service_status(mut self, probe: Arc<dyn ServiceStatusProbe>) -> Self {
        self.services = Some(probe);
        self
    }

    pub async fn evaluate(&self, condition: &SuccessCondition) -> bool {
        let met = match condition {
            SuccessCondition::HttpResponse { url } => {
                let Some(http) = &self.http else {
                    warn!(%condition, "no http probe configured");
                    return false;
                };
                match http.is_success(url).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(%condition, error = %e, "http probe failed");
                        false
                    }
                }
            }
            SuccessCondition::ServiceStatus { service, expected } => {
                let Some(services) = &self.services else {
                    warn!(%condition, "no service status probe configured");
                    return false;
                };
                match services.status(service).await {
                    Ok(status) => status == *expected,
                    Err(e) => {
                        warn!(%condition, error = %e, "service status probe failed");
                        false
                    }
                }
            }
            SuccessCondition::MetricThreshold { metric, op, value } => {
                let current = self.metrics.latest_value(metric).await;
                op.holds(current, *value)
            }
        };
        debug!(%condition, met, "success condition evaluated");
        met
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("http", &self.http.is_some())
            .field("services", &self.services.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mender_core::MetricOp;
    use mender_handlers::{HandlerError, MemoryMetrics, StaticServiceStatus};

    use super::*;

    struct FixedHttp(Result<bool, ()>);

    #[async_trait]
    impl HttpProbe for FixedHttp {
        async fn is_success(&self, url: &str) -> Result<bool, HandlerError> {
            self.0
                .map_err(|()| HandlerError::Connection(format!("connection refused: {url}")))
        }
    }

    fn http(url: &str) -> SuccessCondition {
        SuccessCondition::HttpResponse { url: url.into() }
    }

    #[tokio::test]
    async fn metric_thresholds_read_latest_value() {
        let metrics = Arc::new(MemoryMetrics::new());
        metrics.set("memory_usage", 75.0);
        let eval = ConditionEvaluator::new(metrics.clone());

        let below = SuccessCondition::MetricThreshold {
            metric: "memory_usage".into(),
            op: MetricOp::Lt,
            value: 80.0,
        };
        assert!(eval.evaluate(&below).await);

        metrics.set("memory_usage", 82.0);
        assert!(!eval.evaluate(&below).await);
    }

    #[tokio::test]
    async fn missing_probes_are_not_satisfied() {
        let eval = ConditionEvaluator::new(Arc::new(MemoryMetrics::new()));
        assert!(!eval.evaluate(&http("http://localhost:4000/health")).await);

        let status = SuccessCondition::ServiceStatus {
            service: "postgresql".into(),
            expected: "running".into(),
        };
        assert!(!eval.evaluate(&status).await);
    }

    #[tokio::test]
    async fn probe_errors_are_not_satisfied() {
        let metrics = Arc::new(MemoryMetrics::new());
        let ok = ConditionEvaluator::new(metrics.clone()).with_http(Arc::new(FixedHttp(Ok(true))));
        assert!(ok.evaluate(&http("http://localhost:4000/health")).await);

        let down = ConditionEvaluator::new(metrics).with_http(Arc::new(FixedHttp(Err(()))));
        assert!(!down.evaluate(&http("http://localhost:4000/health")).await);
    }

    #[tokio::test]
    async fn service_status_is_an_exact_match() {
        let services = Arc::new(StaticServiceStatus::new());
        services.set("postgresql", "running");
        let eval = ConditionEvaluator::new(Arc::new(MemoryMetrics::new()))
            .with_service_status(services.clone());

        let running = SuccessCondition::ServiceStatus {
            service: "postgresql".into(),
            expected: "running".into(),
        };
        assert!(eval.evaluate(&running).await);

        services.set("postgresql", "Running");
        assert!(!eval.evaluate(&running).await);
    }
}
