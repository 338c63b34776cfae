use async_trait::async_trait;
use mender_core::{Alert, EscalationRequest};
use parking_lot::Mutex;
use tracing::warn;

/// Hands unresolved incidents to humans. Fire-and-forget.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn escalate(&self, alert: &Alert, request: EscalationRequest);
}

/// Logs every escalation at `warn` and keeps a copy for inspection.
#[derive(Default)]
pub struct LogEscalationSink {
    escalations: Mutex<Vec<(Alert, EscalationRequest)>>,
}

impl LogEscalationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Escalations seen so far, oldest first.
    pub fn escalations(&self) -> Vec<(Alert, EscalationRequest)> {
        self.escalations.lock().clone()
    }
}

#[async_trait]
impl EscalationSink for LogEscalationSink {
    async fn escalate(&self, alert: &Alert, request: EscalationRequest) {
        warn!(
            alert_id = %alert.id,
            title = %alert.title,
            severity = %alert.severity,
            reason = %request.reason,
            urgency = ?request.urgency,
            attempt_id = request.attempt_id.as_deref().unwrap_or("-"),
            "escalating alert to manual intervention"
        );
        self.escalations.lock().push((alert.clone(), request));
    }
}
