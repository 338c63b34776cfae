use std::collections::HashMap;

use async_trait::async_trait;
use mender_core::{Alert, AlertStatus};
use parking_lot::RwLock;

use crate::error::HandlerError;

/// Persistence for alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Alerts with status `active`, newest first.
    async fn active_alerts(&self) -> Result<Vec<Alert>, HandlerError>;

    async fn get(&self, id: &str) -> Result<Option<Alert>, HandlerError>;

    /// The open alert carrying `fingerprint`, if any.
    async fn find_open_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Alert>, HandlerError>;

    /// Insert or replace an alert.
    async fn save(&self, alert: Alert) -> Result<(), HandlerError>;

    /// Bump the occurrence count of an existing alert and refresh its
    /// observed value.
    async fn record_occurrence(
        &self,
        id: &str,
        current_value: Option<f64>,
    ) -> Result<(), HandlerError>;

    /// Mark an alert resolved.
    async fn resolve(&self, id: &str, resolved_by: &str, notes: &str)
    -> Result<(), HandlerError>;
}

/// In-memory [`AlertStore`].
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<HashMap<String, Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn active_alerts(&self) -> Result<Vec<Alert>, HandlerError> {
        let mut active: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn get(&self, id: &str) -> Result<Option<Alert>, HandlerError> {
        Ok(self.alerts.read().get(id).cloned())
    }

    async fn find_open_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Alert>, HandlerError> {
        Ok(self
            .alerts
            .read()
            .values()
            .find(|a| a.is_open() && a.fingerprint.as_deref() == Some(fingerprint))
            .cloned())
    }

    async fn save(&self, alert: Alert) -> Result<(), HandlerError> {
        self.alerts.write().insert(alert.id.clone(), alert);
        Ok(())
    }

    async fn record_occurrence(
        &self,
        id: &str,
        current_value: Option<f64>,
    ) -> Result<(), HandlerError> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| HandlerError::ExecutionFailed(format!("alert not found: {id}")))?;
        alert.occurrence_count = alert.occurrence_count.saturating_add(1);
        if current_value.is_some() {
            alert.current_value = current_value;
        }
        Ok(())
    }

    async fn resolve(
        &self,
        id: &str,
        resolved_by: &str,
        notes: &str,
    ) -> Result<(), HandlerError> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .get_mut(id)
            .ok_or_else(|| HandlerError::ExecutionFailed(format!("alert not found: {id}")))?;
        alert.resolve(resolved_by, notes);
        Ok(())
    }
}
