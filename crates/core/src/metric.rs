use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a metric record written to the metrics sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    /// Host-level readings: CPU, memory, disk.
    System,
    /// Latency and throughput readings.
    Performance,
    /// Circuit breaker state, error rate and response time.
    CircuitBreaker,
    /// Duration of a validated recovery.
    RecoveryTime,
    /// Share of recoveries that succeeded.
    RecoverySuccess,
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Performance => write!(f, "performance"),
            Self::CircuitBreaker => write!(f, "circuit_breaker"),
            Self::RecoveryTime => write!(f, "recovery_time"),
            Self::RecoverySuccess => write!(f, "recovery_success"),
        }
    }
}

/// A single metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub category: MetricCategory,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl MetricRecord {
    pub fn new(
        category: MetricCategory,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            value,
            unit: unit.into(),
            source: String::new(),
            metadata: serde_json::Map::new(),
            recorded_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
