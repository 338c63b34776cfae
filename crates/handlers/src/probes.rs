use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::HandlerError;

/// Looks up the status string of a named service.
#[async_trait]
pub trait ServiceStatusProbe: Send + Sync {
    async fn status(&self, service: &str) -> Result<String, HandlerError>;
}

/// Checks whether a URL answers with a success status.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn is_success(&self, url: &str) -> Result<bool, HandlerError>;
}

/// Host-level health snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// One-minute load average.
    pub cpu_load: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

#[async_trait]
pub trait SystemHealthProbe: Send + Sync {
    async fn snapshot(&self) -> Result<SystemHealth, HandlerError>;
}

/// Watches rollouts. Polled periodically by the background processor.
#[async_trait]
pub trait DeploymentMonitor: Send + Sync {
    async fn check_active_deployments(&self) -> Result<(), HandlerError>;

    async fn validate_deployment_health(&self) -> Result<(), HandlerError>;
}

/// Service statuses held in memory. Unknown services report `unknown`.
#[derive(Default)]
pub struct StaticServiceStatus {
    statuses: RwLock<HashMap<String, String>>,
}

impl StaticServiceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, service: impl Into<String>, status: impl Into<String>) {
        self.statuses.write().insert(service.into(), status.into());
    }
}

#[async_trait]
impl ServiceStatusProbe for StaticServiceStatus {
    async fn status(&self, service: &str) -> Result<String, HandlerError> {
        Ok(self
            .statuses
            .read()
            .get(service)
            .cloned()
            .unwrap_or_else(|| "unknown".into()))
    }
}

/// Asks systemd for a unit's state and reports it in the playbook
/// vocabulary: `running`, `stopped`, `failed` or the raw systemd word.
pub struct SystemctlStatusProbe;

#[async_trait]
impl ServiceStatusProbe for SystemctlStatusProbe {
    async fn status(&self, service: &str) -> Result<String, HandlerError> {
        let output = Command::new("systemctl")
            .arg("is-active")
            .arg(service)
            .output()
            .await
            .map_err(|e| HandlerError::Connection(format!("failed to run systemctl: {e}")))?;
        // `is-active` exits non-zero for anything but active; stdout still
        // carries the state.
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(match raw.as_str() {
            "active" => "running".into(),
            "inactive" => "stopped".into(),
            _ => raw,
        })
    }
}

/// Reads load, memory and disk usage from `/proc` and `df`.
pub struct ProcSystemHealth;

impl ProcSystemHealth {
    fn parse_loadavg(raw: &str) -> Option<f64> {
        raw.split_whitespace().next()?.parse().ok()
    }

    fn parse_meminfo(raw: &str) -> Option<f64> {
        let field = |name: &str| -> Option<f64> {
            raw.lines()
                .find(|l| l.starts_with(name))?
                .split_whitespace()
                .nth(1)?
                .parse()
                .ok()
        };
        let total = field("MemTotal:")?;
        let available = field("MemAvailable:")?;
        if total <= 0.0 {
            return None;
        }
        Some((total - available) / total * 100.0)
    }

    fn parse_df(raw: &str) -> Option<f64> {
        // Second line, fifth column: "Use%" such as "42%".
        raw.lines()
            .nth(1)?
            .split_whitespace()
            .nth(4)?
            .trim_end_matches('%')
            .parse()
            .ok()
    }
}

#[async_trait]
impl SystemHealthProbe for ProcSystemHealth {
    async fn snapshot(&self) -> Result<SystemHealth, HandlerError> {
        let io = |e: std::io::Error| HandlerError::Connection(e.to_string());
        let loadavg = tokio::fs::read_to_string("/proc/loadavg").await.map_err(io)?;
        let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.map_err(io)?;
        let df = Command::new("df").arg("-P").arg("/").output().await.map_err(io)?;

        Ok(SystemHealth {
            cpu_load: Self::parse_loadavg(&loadavg).unwrap_or(0.0),
            memory_percent: Self::parse_meminfo(&meminfo).unwrap_or(0.0),
            disk_percent: Self::parse_df(&String::from_utf8_lossy(&df.stdout)).unwrap_or(0.0),
        })
    }
}
