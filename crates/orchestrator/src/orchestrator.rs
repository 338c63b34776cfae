use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use mender_circuit::{CallError, CircuitRegistry, CircuitRole, CircuitStats};
use mender_core::{
    Alert, AttemptStatus, EscalationReason, EscalationRequest, HealthState, MetricCategory,
    MetricRecord, OrchestratorStatus, Phase, RecoveryAction, RecoveryActionUpdate,
    RecoveryAttempt, RecoveryStats, RecoveryStep, StepExecution, StepStatus,
};
use mender_handlers::{
    AlertStore, EscalationSink, HandlerError, HandlerRegistry, MetricsSink, MetricsSource,
    StepOutput, SystemHealth,
};
use parking_lot::{Mutex, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::builder::RecoveryConfig;
use crate::catalog::{self, RecoveryCatalog};
use crate::conditions::ConditionEvaluator;
use crate::error::{CatalogError, OrchestratorError};
use crate::metrics::{MetricsSnapshot, OrchestratorMetrics};

/// Default number of attempts returned by [`RecoveryOrchestrator::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Who alerts resolved by a successful recovery are attributed to.
pub const RESOLVED_BY: &str = "auto-recovery-system";

const RESOLUTION_NOTES: &str = "Issue resolved by automated recovery";

/// What [`RecoveryOrchestrator::handle_alert`] did with an alert.
#[derive(Debug, Clone)]
pub enum AlertDisposition {
    /// Automated recovery is switched off.
    Disabled,
    /// An attempt for this alert is already in flight.
    AlreadyActive,
    /// Parked until a recovery slot frees up.
    Queued,
    /// Handed to a human without running a playbook.
    Escalated(EscalationReason),
    /// A playbook ran. The attempt tells whether it worked.
    Executed(Box<RecoveryAttempt>),
}

enum ActiveRecovery {
    /// Slot reserved while a playbook is being selected.
    Matching,
    Running(RecoveryAttempt),
}

#[derive(Default)]
pub(crate) struct RecoveryState {
    enabled: bool,
    active: HashMap<String, ActiveRecovery>,
    /// Finished attempts, oldest first.
    history: VecDeque<RecoveryAttempt>,
    queue: VecDeque<Alert>,
    last_global_recovery: Option<DateTime<Utc>>,
}

impl RecoveryState {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    fn in_global_cooldown(&self, cooldown: Duration, now: DateTime<Utc>) -> bool {
        if cooldown.is_zero() {
            return false;
        }
        self.last_global_recovery
            .is_some_and(|last| (now - last).to_std().map_or(true, |elapsed| elapsed < cooldown))
    }

    /// Most recent start time per action id, over history and running
    /// attempts.
    fn last_starts(&self) -> HashMap<String, DateTime<Utc>> {
        let running = self.active.values().filter_map(|a| match a {
            ActiveRecovery::Running(attempt) => Some(attempt),
            ActiveRecovery::Matching => None,
        });
        let mut last: HashMap<String, DateTime<Utc>> = HashMap::new();
        for attempt in self.history.iter().chain(running) {
            last.entry(attempt.action_id.clone())
                .and_modify(|t| *t = (*t).max(attempt.started_at))
                .or_insert(attempt.started_at);
        }
        last
    }

    /// Mark a new attempt for `alert` as running and stamp the global
    /// cooldown with its start.
    fn start_attempt(&mut self, alert: &Alert, action: &RecoveryAction) -> RecoveryAttempt {
        let attempt = RecoveryAttempt::new(&alert.id, &action.id);
        self.active
            .insert(alert.id.clone(), ActiveRecovery::Running(attempt.clone()));
        self.last_global_recovery = Some(attempt.started_at);
        attempt
    }
}

enum Admission {
    Disabled,
    AlreadyActive,
    GlobalCooldown,
    AtCapacity,
    Reserved(Reservation),
}

/// Holds an alert's slot in the active map. Dropping it frees the slot, even
/// when the owning future is cancelled.
struct Reservation {
    state: Arc<Mutex<RecoveryState>>,
    alert_id: String,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.state.lock().active.remove(&self.alert_id);
    }
}

enum Claim {
    Started(RecoveryAttempt),
    GlobalCooldown,
    ActionCooldown,
}

enum Outcome {
    Resolved,
    ConditionPersists,
    Exhausted,
}

/// Maps alerts to playbooks, runs them and escalates what it cannot fix.
///
/// Construct with [`OrchestratorBuilder`](crate::OrchestratorBuilder).
pub struct RecoveryOrchestrator {
    pub(crate) config: RecoveryConfig,
    pub(crate) catalog: RwLock<RecoveryCatalog>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) conditions: ConditionEvaluator,
    pub(crate) metrics_source: Arc<dyn MetricsSource>,
    pub(crate) metrics_sink: Arc<dyn MetricsSink>,
    pub(crate) alerts: Arc<dyn AlertStore>,
    pub(crate) escalation: Arc<dyn EscalationSink>,
    pub(crate) circuits: Arc<CircuitRegistry>,
    pub(crate) state: Arc<Mutex<RecoveryState>>,
    pub(crate) counters: Arc<OrchestratorMetrics>,
    pub(crate) tracker: TaskTracker,
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl RecoveryOrchestrator {
    // -- Alert intake ---------------------------------------------------------

    /// Decide what to do with an alert and, if a playbook applies, run it to
    /// completion.
    #[instrument(
        name = "orchestrator.handle_alert",
        skip(self, alert),
        fields(alert.id = %alert.id, alert.severity = %alert.severity)
    )]
    pub async fn handle_alert(&self, alert: Alert) -> AlertDisposition {
        self.counters.increment_alerts_received();
        let now = Utc::now();

        let reservation = match self.admit(&alert.id, now) {
            Admission::Disabled => return AlertDisposition::Disabled,
            Admission::AlreadyActive => {
                debug!("recovery already in progress");
                return AlertDisposition::AlreadyActive;
            }
            Admission::GlobalCooldown => {
                info!("global recovery cooldown active");
                self.escalate(&alert, EscalationReason::GlobalCooldown, None)
                    .await;
                return AlertDisposition::Escalated(EscalationReason::GlobalCooldown);
            }
            Admission::AtCapacity => return self.enqueue(alert).await,
            Admission::Reserved(reservation) => reservation,
        };

        loop {
            let last_starts = self.state.lock().last_starts();
            let candidates = self
                .catalog
                .read()
                .candidates(&alert, now, |id| last_starts.get(id).copied());
            let Some(action) = catalog::select_action(candidates, &*self.metrics_source).await
            else {
                drop(reservation);
                info!("no applicable recovery action");
                self.escalate(&alert, EscalationReason::NoActionFound, None)
                    .await;
                return AlertDisposition::Escalated(EscalationReason::NoActionFound);
            };

            match self.claim(&alert, &action) {
                Claim::Started(attempt) => {
                    let attempt = self
                        .execute_recovery(reservation, attempt, &alert, &action)
                        .await;
                    return AlertDisposition::Executed(Box::new(attempt));
                }
                Claim::GlobalCooldown => {
                    drop(reservation);
                    info!("global recovery cooldown started while matching");
                    self.escalate(&alert, EscalationReason::GlobalCooldown, None)
                        .await;
                    return AlertDisposition::Escalated(EscalationReason::GlobalCooldown);
                }
                // Another alert started this action while thresholds were
                // read; its start now counts toward the cooldown.
                Claim::ActionCooldown => {
                    debug!(action = %action.id, "action claimed concurrently, reselecting");
                }
            }
        }
    }

    /// Re-check both cooldowns against the current state and, if they still
    /// allow it, mark the attempt running and stamp the global cooldown in
    /// the same critical section.
    fn claim(&self, alert: &Alert, action: &RecoveryAction) -> Claim {
        let now = Utc::now();
        let mut state = self.state.lock();
        if state.in_global_cooldown(self.config.global_cooldown, now) {
            return Claim::GlobalCooldown;
        }
        let last_started = state.last_starts().get(&action.id).copied();
        if catalog::in_cooldown(action, last_started, now) {
            return Claim::ActionCooldown;
        }
        Claim::Started(state.start_attempt(alert, action))
    }

    /// Handle an alert on a tracked background task.
    pub fn spawn_alert(self: &Arc<Self>, alert: Alert) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            this.handle_alert(alert).await;
        });
    }

    /// Run `action_id` against the stored alert `alert_id`, skipping
    /// eligibility, cooldowns and the concurrency cap.
    #[instrument(name = "orchestrator.test_recovery_action", skip(self))]
    pub async fn test_recovery_action(
        &self,
        action_id: &str,
        alert_id: &str,
    ) -> Result<RecoveryAttempt, OrchestratorError> {
        let action = self
            .action(action_id)
            .ok_or_else(|| CatalogError::ActionNotFound(action_id.to_owned()))?;
        let alert = self
            .alerts
            .get(alert_id)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?
            .ok_or_else(|| OrchestratorError::AlertNotFound(alert_id.to_owned()))?;

        let reservation = {
            let mut state = self.state.lock();
            if state.active.contains_key(alert_id) {
                return Err(OrchestratorError::RecoveryInProgress(alert_id.to_owned()));
            }
            state
                .active
                .insert(alert_id.to_owned(), ActiveRecovery::Matching);
            Reservation {
                state: Arc::clone(&self.state),
                alert_id: alert_id.to_owned(),
            }
        };

        let attempt = self.state.lock().start_attempt(&alert, &action);
        info!("testing recovery action");
        Ok(self
            .execute_recovery(reservation, attempt, &alert, &action)
            .await)
    }

    fn admit(&self, alert_id: &str, now: DateTime<Utc>) -> Admission {
        let mut state = self.state.lock();
        if !state.enabled {
            return Admission::Disabled;
        }
        if state.active.contains_key(alert_id) {
            return Admission::AlreadyActive;
        }
        if state.in_global_cooldown(self.config.global_cooldown, now) {
            return Admission::GlobalCooldown;
        }
        if state.active.len() >= self.config.max_concurrent_recoveries {
            return Admission::AtCapacity;
        }
        state
            .active
            .insert(alert_id.to_owned(), ActiveRecovery::Matching);
        Admission::Reserved(Reservation {
            state: Arc::clone(&self.state),
            alert_id: alert_id.to_owned(),
        })
    }

    async fn enqueue(&self, alert: Alert) -> AlertDisposition {
        let overflow = {
            let mut state = self.state.lock();
            if state.queue.iter().any(|queued| queued.id == alert.id) {
                return AlertDisposition::Queued;
            }
            if state.queue.len() >= self.config.max_queued_alerts {
                true
            } else {
                state.queue.push_back(alert.clone());
                false
            }
        };

        if overflow {
            warn!("recovery queue full");
            self.escalate(&alert, EscalationReason::QueueFull, None)
                .await;
            return AlertDisposition::Escalated(EscalationReason::QueueFull);
        }
        self.counters.increment_alerts_queued();
        info!("maximum concurrent recoveries reached, alert queued");
        AlertDisposition::Queued
    }

    // -- Execution ------------------------------------------------------------

    #[instrument(
        name = "orchestrator.execute_recovery",
        skip_all,
        fields(alert.id = %alert.id, action.id = %action.id)
    )]
    async fn execute_recovery(
        &self,
        reservation: Reservation,
        mut attempt: RecoveryAttempt,
        alert: &Alert,
        action: &RecoveryAction,
    ) -> RecoveryAttempt {
        self.counters.increment_recoveries_started();
        info!(attempt.id = %attempt.id, "starting recovery attempt");

        let outcome = AssertUnwindSafe(self.run_phases(&mut attempt, alert, action))
            .catch_unwind()
            .await;

        let escalation = match outcome {
            Ok(Ok(Outcome::Resolved)) => {
                attempt.finish(AttemptStatus::Success, true, RESOLUTION_NOTES);
                info!(attempt.id = %attempt.id, "recovery successful");
                self.record_recovery_duration(&attempt).await;
                None
            }
            Ok(Ok(Outcome::ConditionPersists)) => {
                attempt.finish(
                    AttemptStatus::Failed,
                    false,
                    "recovery steps completed but the alert condition persists",
                );
                Some(EscalationReason::RecoveryValidationFailed)
            }
            Ok(Ok(Outcome::Exhausted)) => {
                attempt.finish(
                    AttemptStatus::Failed,
                    false,
                    "immediate and fallback phases failed",
                );
                Some(EscalationReason::AutomatedRecoveryFailed)
            }
            Ok(Err(e)) => {
                error!(attempt.id = %attempt.id, error = %e, "recovery attempt failed with error");
                attempt.finish(AttemptStatus::Failed, false, e.to_string());
                Some(EscalationReason::RecoveryError)
            }
            Err(_) => {
                error!(attempt.id = %attempt.id, "recovery attempt panicked");
                attempt.finish(AttemptStatus::Failed, false, "recovery attempt panicked");
                Some(EscalationReason::RecoveryError)
            }
        };

        if let Some(reason) = escalation {
            self.counters.increment_recoveries_failed();
            warn!(attempt.id = %attempt.id, %reason, "recovery failed");
            self.escalate(alert, reason, Some(attempt.id.clone())).await;
        } else {
            self.counters.increment_recoveries_succeeded();
        }

        {
            let mut state = self.state.lock();
            state.history.push_back(attempt.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
            }
        }
        drop(reservation);
        attempt
    }

    async fn run_phases(
        &self,
        attempt: &mut RecoveryAttempt,
        alert: &Alert,
        action: &RecoveryAction,
    ) -> Result<Outcome, OrchestratorError> {
        for phase in [Phase::Immediate, Phase::Fallback] {
            let steps = action.actions.steps(phase);
            if steps.is_empty() {
                continue;
            }
            info!(%phase, steps = steps.len(), "executing recovery phase");
            if self.run_steps(attempt, steps, phase).await {
                return self.validate_recovery(alert).await;
            }
        }

        info!("automated recovery failed, running escalation steps");
        self.run_steps(attempt, &action.actions.escalation, Phase::Escalation)
            .await;
        Ok(Outcome::Exhausted)
    }

    /// Run one phase's steps in order. Returns whether every step succeeded.
    async fn run_steps(
        &self,
        attempt: &mut RecoveryAttempt,
        steps: &[RecoveryStep],
        phase: Phase,
    ) -> bool {
        let mut all_succeeded = true;
        for step in steps {
            let mut execution = StepExecution::start(phase, step.clone());
            match self.run_step(step).await {
                Ok(output) => {
                    execution.succeed(output.output);
                    if let Some(condition) = &step.success_condition
                        && !self.conditions.evaluate(condition).await
                    {
                        execution.fail(
                            StepStatus::Failed,
                            format!("success condition not met: {condition}"),
                        );
                    }
                }
                Err((status, message)) => execution.fail(status, message),
            }

            let succeeded = execution.status.is_success();
            if succeeded {
                debug!(step = %step.step_type, target = %step.target, "step completed");
            } else {
                warn!(
                    step = %step.step_type,
                    target = %step.target,
                    error = execution.error.as_deref().unwrap_or("-"),
                    "step failed"
                );
            }
            attempt.steps.push(execution);
            self.publish(attempt);

            if !succeeded {
                all_succeeded = false;
                if phase.short_circuits() {
                    break;
                }
            }
        }
        all_succeeded
    }

    async fn run_step(&self, step: &RecoveryStep) -> Result<StepOutput, (StepStatus, String)> {
        let Some(handler) = self.handlers.get(step.step_type) else {
            return Err((
                StepStatus::Failed,
                HandlerError::NotFound(step.step_type).to_string(),
            ));
        };
        let timeout = step.timeout();
        let call = move || async move {
            tokio::time::timeout(timeout, handler.execute(step))
                .await
                .unwrap_or_else(|_| Err(HandlerError::Timeout(timeout)))
        };

        let result = if self.config.guard_steps_with_circuits {
            self.circuits
                .execute_with_role(CircuitRole::RecoveryStep, &step.target, call)
                .await
        } else {
            call().await.map_err(CallError::Operation)
        };

        result.map_err(|e| match e {
            CallError::Operation(HandlerError::Timeout(after))
            | CallError::Timeout { after, .. } => {
                (StepStatus::TimedOut, format!("step timed out after {after:?}"))
            }
            other => (StepStatus::Failed, other.to_string()),
        })
    }

    /// Mirror the in-flight attempt into the active map for observers.
    fn publish(&self, attempt: &RecoveryAttempt) {
        if let Some(entry) = self.state.lock().active.get_mut(&attempt.alert_id) {
            *entry = ActiveRecovery::Running(attempt.clone());
        }
    }

    async fn validate_recovery(&self, alert: &Alert) -> Result<Outcome, OrchestratorError> {
        debug!(settle = ?self.config.settle_period, "waiting before validating recovery");
        tokio::time::sleep(self.config.settle_period).await;

        if !self.check_alert_resolution(alert).await {
            return Ok(Outcome::ConditionPersists);
        }
        let mut resolved = alert.clone();
        resolved.resolve(RESOLVED_BY, RESOLUTION_NOTES);
        self.alerts
            .save(resolved)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        Ok(Outcome::Resolved)
    }

    /// Re-read the alert's metric and invert its trigger comparison. Alerts
    /// without a metric, threshold or operator never validate.
    async fn check_alert_resolution(&self, alert: &Alert) -> bool {
        let (Some(metric), Some(threshold), Some(op)) = (
            alert.metric_name.as_deref(),
            alert.threshold_value,
            alert.comparison_operator,
        ) else {
            debug!("alert has no metric to validate against");
            return false;
        };
        let current = self.metrics_source.latest_value(metric).await;
        let resolved = op.is_resolved(current, threshold);
        debug!(metric, current, threshold, %op, resolved, "validated alert metric");
        resolved
    }

    async fn escalate(&self, alert: &Alert, reason: EscalationReason, attempt_id: Option<String>) {
        self.counters.increment_escalations();
        let request = EscalationRequest::new(alert, reason, attempt_id);
        self.escalation.escalate(alert, request).await;
    }

    // -- Metrics --------------------------------------------------------------

    #[allow(clippy::cast_precision_loss)]
    async fn record_recovery_duration(&self, attempt: &RecoveryAttempt) {
        let duration_ms = attempt.duration_ms().unwrap_or(0);
        let record = MetricRecord::new(
            MetricCategory::RecoveryTime,
            "Recovery Duration",
            duration_ms as f64,
            "ms",
        )
        .with_source("auto-recovery")
        .with_meta("alert_id", attempt.alert_id.clone())
        .with_meta("action_id", attempt.action_id.clone())
        .with_meta("success", attempt.status == AttemptStatus::Success)
        .with_meta("steps_executed", attempt.steps.len());
        self.metrics_sink.record(record).await;
    }

    /// Record successful attempts as a percentage of all retained attempts.
    #[allow(clippy::cast_precision_loss)]
    pub async fn record_success_rate(&self) -> f64 {
        let stats = self.stats();
        let rate =
            stats.successful_recoveries as f64 / stats.total_attempts.max(1) as f64 * 100.0;
        let record = MetricRecord::new(
            MetricCategory::RecoverySuccess,
            "Auto Recovery Success Rate",
            rate,
            "%",
        )
        .with_source(RESOLVED_BY);
        self.metrics_sink.record(record).await;
        rate
    }

    /// Record a host health snapshot.
    pub async fn record_system_health(&self, health: SystemHealth) {
        let records = [
            MetricRecord::new(MetricCategory::System, "CPU Load Average", health.cpu_load, "load")
                .with_source("system"),
            MetricRecord::new(MetricCategory::System, "Memory Usage", health.memory_percent, "%")
                .with_source("system"),
            MetricRecord::new(MetricCategory::System, "Disk Usage", health.disk_percent, "%")
                .with_source("system-disk"),
        ];
        for record in records {
            self.metrics_sink.record(record).await;
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.counters.snapshot()
    }

    // -- Periodic work --------------------------------------------------------

    /// Feed stored active alerts that have no attempt and are not queued back
    /// through [`handle_alert`](Self::handle_alert). Returns how many were
    /// dispatched.
    pub async fn monitor_active_alerts(self: &Arc<Self>) -> Result<usize, OrchestratorError> {
        let alerts = self
            .alerts
            .active_alerts()
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

        let pending: Vec<Alert> = {
            let state = self.state.lock();
            alerts
                .into_iter()
                .filter(|a| {
                    !state.active.contains_key(&a.id) && !state.queue.iter().any(|q| q.id == a.id)
                })
                .collect()
        };
        let dispatched = pending.len();
        for alert in pending {
            self.spawn_alert(alert);
        }
        if dispatched > 0 {
            debug!(dispatched, "dispatched active alerts");
        }
        Ok(dispatched)
    }

    /// Move queued alerts into free recovery slots. Returns how many were
    /// dispatched.
    pub fn process_queue(self: &Arc<Self>) -> usize {
        let ready: Vec<Alert> = {
            let mut state = self.state.lock();
            if !state.enabled {
                return 0;
            }
            let free = self
                .config
                .max_concurrent_recoveries
                .saturating_sub(state.active.len());
            let take = free.min(state.queue.len());
            state.queue.drain(..take).collect()
        };
        let dispatched = ready.len();
        for alert in ready {
            self.spawn_alert(alert);
        }
        if dispatched > 0 {
            info!(dispatched, "processing queued alerts");
        }
        dispatched
    }

    /// Drop history entries older than the retention window. Returns how many
    /// were removed.
    pub fn prune_history(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.history_retention)
            .unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return 0;
        };
        let mut state = self.state.lock();
        let before = state.history.len();
        state.history.retain(|a| a.started_at >= cutoff);
        let removed = before - state.history.len();
        if removed > 0 {
            debug!(removed, "pruned recovery history");
        }
        removed
    }

    /// Log any problem [`status`](Self::status) reports.
    pub fn self_check(&self) -> OrchestratorStatus {
        let status = self.status();
        if status.status != HealthState::Healthy {
            warn!(status = ?status.status, issues = ?status.issues, "auto-recovery is not healthy");
        }
        status
    }

    /// Wait for spawned alert tasks to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        info!("recovery orchestrator shutdown complete");
    }

    // -- Administration -------------------------------------------------------

    pub fn enable(&self) {
        self.state.lock().enabled = true;
        info!("auto-recovery enabled");
    }

    pub fn disable(&self) {
        self.state.lock().enabled = false;
        info!("auto-recovery disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn actions(&self) -> Vec<RecoveryAction> {
        self.catalog.read().list().to_vec()
    }

    pub fn action(&self, id: &str) -> Option<RecoveryAction> {
        self.catalog.read().get(id).cloned()
    }

    pub fn add_action(&self, action: RecoveryAction) -> Result<(), OrchestratorError> {
        self.check_handlers(&action)?;
        let id = action.id.clone();
        self.catalog.write().add(action)?;
        info!(action = %id, "added recovery action");
        Ok(())
    }

    pub fn update_action(
        &self,
        id: &str,
        update: RecoveryActionUpdate,
    ) -> Result<RecoveryAction, OrchestratorError> {
        if let Some(phases) = &update.actions {
            let missing = self.handlers.missing(phases.all_steps().map(|s| s.step_type));
            if !missing.is_empty() {
                return Err(CatalogError::InvalidAction(missing_handlers(&missing)).into());
            }
        }
        let updated = self.catalog.write().update(id, update)?;
        info!(action = %id, "updated recovery action");
        Ok(updated)
    }

    pub fn remove_action(&self, id: &str) -> Result<RecoveryAction, OrchestratorError> {
        let removed = self.catalog.write().remove(id)?;
        info!(action = %id, "removed recovery action");
        Ok(removed)
    }

    fn check_handlers(&self, action: &RecoveryAction) -> Result<(), CatalogError> {
        let missing = self
            .handlers
            .missing(action.actions.all_steps().map(|s| s.step_type));
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::InvalidAction(missing_handlers(&missing)))
        }
    }

    /// Finished attempts, newest first.
    pub fn history(&self, limit: usize) -> Vec<RecoveryAttempt> {
        let mut history: Vec<RecoveryAttempt> =
            self.state.lock().history.iter().rev().cloned().collect();
        history.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        history.truncate(limit);
        history
    }

    /// Attempts currently executing.
    pub fn active_recoveries(&self) -> Vec<RecoveryAttempt> {
        let mut active: Vec<RecoveryAttempt> = self
            .state
            .lock()
            .active
            .values()
            .filter_map(|a| match a {
                ActiveRecovery::Running(attempt) => Some(attempt.clone()),
                ActiveRecovery::Matching => None,
            })
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    /// Alerts waiting for a recovery slot, oldest first.
    pub fn queued_alerts(&self) -> Vec<Alert> {
        self.state.lock().queue.iter().cloned().collect()
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats::from_attempts(&self.state.lock().history)
    }

    pub fn status(&self) -> OrchestratorStatus {
        let registered_actions = self.catalog.read().len();
        let max = self.config.max_concurrent_recoveries;
        let state = self.state.lock();
        let active = state.active.len();

        let mut issues = Vec::new();
        if !state.enabled {
            issues.push("auto-recovery is disabled".to_owned());
        }
        // More than 80% of the concurrency cap in use.
        if active * 5 > max * 4 {
            issues.push(format!("high number of active recoveries: {active}"));
        }
        if state.in_global_cooldown(self.config.global_cooldown, Utc::now()) {
            issues.push("global recovery cooldown is active".to_owned());
        }

        let status = if !state.enabled || active >= max {
            HealthState::Unhealthy
        } else if issues.is_empty() {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };

        OrchestratorStatus {
            status,
            enabled: state.enabled,
            active_recoveries: active,
            queued_alerts: state.queue.len(),
            registered_actions,
            max_concurrent_recoveries: max,
            last_global_recovery: state.last_global_recovery,
            issues,
        }
    }

    // -- Circuits -------------------------------------------------------------

    pub fn circuits(&self) -> &Arc<CircuitRegistry> {
        &self.circuits
    }

    pub fn circuit_stats(&self) -> Vec<CircuitStats> {
        self.circuits.all_stats()
    }

    pub fn circuit(&self, id: &str) -> Option<CircuitStats> {
        self.circuits.stats(id)
    }

    pub fn reset_circuit(&self, id: &str) -> bool {
        let found = self.circuits.reset(id);
        if found {
            info!(circuit = %id, "circuit reset by operator");
        }
        found
    }

    pub fn reset_all_circuits(&self) -> usize {
        let count = self.circuits.reset_all();
        info!(count, "all circuits reset by operator");
        count
    }

    pub fn force_open_circuit(&self, id: &str) -> bool {
        let found = self.circuits.force_open(id);
        if found {
            warn!(circuit = %id, "circuit forced open by operator");
        }
        found
    }
}

pub(crate) fn missing_handlers(missing: &[mender_core::StepType]) -> String {
    let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
    format!("no handler registered for step types: {}", names.join(", "))
}
