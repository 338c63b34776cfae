use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking what the orchestrator did with the alerts it saw.
///
/// All counters use relaxed ordering. For a consistent point-in-time view,
/// call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    /// Alerts passed to `handle_alert`.
    pub alerts_received: AtomicU64,
    /// Recovery attempts that began executing a playbook.
    pub recoveries_started: AtomicU64,
    /// Attempts that finished with the alert resolved.
    pub recoveries_succeeded: AtomicU64,
    /// Attempts that finished without resolving the alert.
    pub recoveries_failed: AtomicU64,
    /// Alerts handed to the escalation sink.
    pub escalations: AtomicU64,
    /// Alerts parked on the backpressure queue.
    pub alerts_queued: AtomicU64,
    /// Alerts raised (or re-observed) by the circuit health monitor.
    pub circuit_alerts: AtomicU64,
}

impl OrchestratorMetrics {
    pub fn increment_alerts_received(&self) {
        self.alerts_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recoveries_started(&self) {
        self.recoveries_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recoveries_succeeded(&self) {
        self.recoveries_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recoveries_failed(&self) {
        self.recoveries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_escalations(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alerts_queued(&self) {
        self.alerts_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_circuit_alerts(&self) {
        self.circuit_alerts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            alerts_received: self.alerts_received.load(Ordering::Relaxed),
            recoveries_started: self.recoveries_started.load(Ordering::Relaxed),
            recoveries_succeeded: self.recoveries_succeeded.load(Ordering::Relaxed),
            recoveries_failed: self.recoveries_failed.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            alerts_queued: self.alerts_queued.load(Ordering::Relaxed),
            circuit_alerts: self.circuit_alerts.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`OrchestratorMetrics`] at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub alerts_received: u64,
    pub recoveries_started: u64,
    pub recoveries_succeeded: u64,
    pub recoveries_failed: u64,
    pub escalations: u64,
    pub alerts_queued: u64,
    pub circuit_alerts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = OrchestratorMetrics::default();
        metrics.increment_alerts_received();
        metrics.increment_alerts_received();
        metrics.increment_recoveries_started();
        metrics.increment_escalations();

        let snap = metrics.snapshot();
        assert_eq!(snap.alerts_received, 2);
        assert_eq!(snap.recoveries_started, 1);
        assert_eq!(snap.escalations, 1);
        assert_eq!(snap.recoveries_succeeded, 0);
        assert_eq!(snap.circuit_alerts, 0);
    }

    #[test]
    fn default_snapshot_is_zero() {
        assert_eq!(OrchestratorMetrics::default().snapshot(), MetricsSnapshot::default());
    }
}
