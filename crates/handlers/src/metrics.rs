use std::collections::HashMap;

use async_trait::async_trait;
use mender_core::{MetricCategory, MetricRecord};
use parking_lot::RwLock;

/// Read side of the metrics store.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Latest value recorded for `metric_name`, or `0.0` when there is none.
    ///
    /// Implementations must not fail; lookup errors map to the sentinel.
    async fn latest_value(&self, metric_name: &str) -> f64;
}

/// Write side of the metrics store.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, record: MetricRecord);
}

/// In-memory metrics store that keeps the latest value per metric name plus a
/// bounded log of every record.
pub struct MemoryMetrics {
    latest: RwLock<HashMap<String, f64>>,
    records: RwLock<Vec<MetricRecord>>,
    capacity: usize,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            latest: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Set the latest value of a metric directly.
    pub fn set(&self, metric_name: impl Into<String>, value: f64) {
        self.latest.write().insert(metric_name.into(), value);
    }

    /// Every retained record, oldest first.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.read().clone()
    }

    /// Retained records of one category.
    pub fn records_in(&self, category: MetricCategory) -> Vec<MetricRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.category == category)
            .cloned()
            .collect()
    }
}

impl Default for MemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for MemoryMetrics {
    async fn latest_value(&self, metric_name: &str) -> f64 {
        self.latest.read().get(metric_name).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl MetricsSink for MemoryMetrics {
    async fn record(&self, record: MetricRecord) {
        self.latest.write().insert(record.name.clone(), record.value);
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            let excess = records.len() + 1 - self.capacity;
            records.drain(..excess);
        }
        records.push(record);
    }
}
