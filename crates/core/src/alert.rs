use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Severity of an alert. Playbooks match on severity exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Broad category of the condition that raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    System,
    Performance,
    Database,
    Deployment,
    Network,
    Security,
    Application,
}

/// Lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

/// Operator the monitoring system used when it compared a metric against the
/// alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl ComparisonOperator {
    /// Whether the triggering condition no longer holds for `current`.
    ///
    /// The check is the inverse of the trigger: an alert raised because the
    /// metric was `> threshold` is resolved once the metric is `<= threshold`.
    pub fn is_resolved(self, current: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => current <= threshold,
            Self::LessThan => current >= threshold,
            Self::GreaterOrEqual => current < threshold,
            Self::LessOrEqual => current > threshold,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GreaterThan => write!(f, ">"),
            Self::LessThan => write!(f, "<"),
            Self::GreaterOrEqual => write!(f, ">="),
            Self::LessOrEqual => write!(f, "<="),
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            ">=" => Ok(Self::GreaterOrEqual),
            "<=" => Ok(Self::LessOrEqual),
            other => Err(CoreError::UnknownOperator(other.to_owned())),
        }
    }
}

/// An alert raised by external monitoring and consumed by the recovery engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier. At most one recovery attempt runs per id.
    pub id: String,
    /// Short human-readable summary.
    pub title: String,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub status: AlertStatus,
    /// Component that raised the alert (e.g. `circuit-breaker`).
    #[serde(default)]
    pub source: String,
    /// Key used to collapse repeated occurrences of the same condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Metric whose value triggered the alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_operator: Option<ComparisonOperator>,
    /// How many times the same condition has been observed while open.
    #[serde(default = "default_occurrences")]
    pub occurrence_count: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

fn default_occurrences() -> u32 {
    1
}

impl Alert {
    /// Create an active alert with a generated id.
    #[must_use]
    pub fn new(title: impl Into<String>, severity: Severity, alert_type: AlertType) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            title: title.into(),
            severity,
            alert_type,
            status: AlertStatus::Active,
            source: String::new(),
            fingerprint: None,
            metric_name: None,
            current_value: None,
            threshold_value: None,
            comparison_operator: None,
            occurrence_count: 1,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    /// Replace the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the component that raised the alert.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the deduplication fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Attach the triggering metric, its observed value and the threshold it
    /// crossed.
    #[must_use]
    pub fn with_metric(
        mut self,
        name: impl Into<String>,
        current: f64,
        threshold: f64,
        op: ComparisonOperator,
    ) -> Self {
        self.metric_name = Some(name.into());
        self.current_value = Some(current);
        self.threshold_value = Some(threshold);
        self.comparison_operator = Some(op);
        self
    }

    /// Whether the alert is still open (active or acknowledged).
    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Resolved
    }

    /// Mark the alert resolved.
    pub fn resolve(&mut self, resolved_by: impl Into<String>, notes: impl Into<String>) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(resolved_by.into());
        self.resolution_notes = Some(notes.into());
    }
}
