mod background;
mod circuit_breaker;
mod health;
mod recovery;
mod server;


pub use background::*;
pub use circuit_breaker::*;
pub use health::*;
pub use recovery::*;
pub use server::*;

use std::path::Path;

use mender_core::RecoveryAction;
use mender_orchestrator::RecoveryCatalog;
use serde::Deserialize;

use crate::error::ServerError;

/// Top-level configuration for the Mender server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct MenderConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Recovery orchestrator configuration.
    #[serde(default)]
    pub recovery: RecoveryServerConfig,
    /// Default and per-circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerServerConfig,
    /// Limits used by the circuit health poll.
    #[serde(default)]
    pub health: HealthServerConfig,
    /// Periodic task configuration.
    #[serde(default)]
    pub background: BackgroundServerConfig,
    /// Extra playbooks registered on top of the built-in ones.
    #[serde(default)]
    pub actions: Vec<RecoveryAction>,
}

impl MenderConfig {
    /// Parse a configuration document.
    pub fn parse(contents: &str) -> Result<Self, ServerError> {
        toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load the configuration at `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Self::parse("");
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Check every section and assemble the playbook catalog.
    pub fn validate(&self) -> Result<RecoveryCatalog, ServerError> {
        self.recovery
            .to_recovery_config()
            .validate()
            .map_err(|e| ServerError::Config(format!("[recovery] {e}")))?;
        self.circuit_breaker.validate()?;
        self.catalog()
    }

    /// The built-in playbooks (unless disabled) plus the configured ones.
    pub fn catalog(&self) -> Result<RecoveryCatalog, ServerError> {
        let mut catalog = if self.recovery.load_default_actions {
            RecoveryCatalog::with_defaults()
        } else {
            RecoveryCatalog::new()
        };
        for action in &self.actions {
            catalog
                .add(action.clone())
                .map_err(|e| ServerError::Config(format!("[[actions]] {e}")))?;
        }
        Ok(catalog)
    }
}
