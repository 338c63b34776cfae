use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::breaker::{CircuitBreaker, CircuitStats};
use crate::config::{CircuitBreakerConfig, CircuitRole};
use crate::error::CallError;

/// Owns every named circuit.
///
/// Circuits are created lazily on first use. The configuration used is, in
/// order of precedence: an operator override registered for the id, the
/// config supplied by the caller (usually a role default), then the
/// registry-wide default.
pub struct CircuitRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    circuits: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            circuits: RwLock::new(HashMap::new()),
        }
    }

    /// Pin the configuration of one circuit id.
    #[must_use]
    pub fn with_override(mut self, id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(id.into(), config);
        self
    }

    /// Return the circuit for `id`, creating it if needed.
    pub fn get_or_create_circuit(
        &self,
        id: &str,
        service_name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuits.read().get(id) {
            return Arc::clone(existing);
        }

        let mut circuits = self.circuits.write();
        // Another caller may have created it between the two locks.
        let circuit = circuits.entry(id.to_owned()).or_insert_with(|| {
            let config = self
                .overrides
                .get(id)
                .cloned()
                .or(config)
                .unwrap_or_else(|| self.defaults.clone());
            debug!(circuit = %id, service = %service_name, "creating circuit");
            Arc::new(CircuitBreaker::new(id, service_name, config))
        });
        Arc::clone(circuit)
    }

    pub fn get(&self, id: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.read().get(id).cloned()
    }

    /// Run `operation` through the circuit `id`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        id: &str,
        service_name: &str,
        operation: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.get_or_create_circuit(id, service_name, None)
            .execute(operation)
            .await
    }

    /// Run `operation` through the circuit for `name` under `role`, creating it
    /// with the role's defaults.
    pub async fn execute_with_role<T, E, F, Fut>(
        &self,
        role: CircuitRole,
        name: &str,
        operation: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let id = role.circuit_id(name);
        self.get_or_create_circuit(&id, name, Some(role.default_config()))
            .execute(operation)
            .await
    }

    pub async fn execute_database_operation<T, E, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with_role(CircuitRole::Database, name, operation)
            .await
    }

    pub async fn execute_external_api_call<T, E, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with_role(CircuitRole::ExternalApi, name, operation)
            .await
    }

    pub async fn execute_internal_service<T, E, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with_role(CircuitRole::InternalService, name, operation)
            .await
    }

    /// Sorted list of circuit ids.
    pub fn circuit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.circuits.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Stats for every circuit, sorted by id.
    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let circuits: Vec<Arc<CircuitBreaker>> = self.circuits.read().values().cloned().collect();
        let mut stats: Vec<CircuitStats> = circuits.iter().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.id.cmp(&b.id));
        stats
    }

    pub fn stats(&self, id: &str) -> Option<CircuitStats> {
        self.get(id).map(|c| c.stats())
    }

    /// Close one circuit. Returns `false` if it does not exist.
    pub fn reset(&self, id: &str) -> bool {
        self.get(id).is_some_and(|c| {
            c.reset();
            true
        })
    }

    /// Close every circuit and return how many were reset.
    pub fn reset_all(&self) -> usize {
        let circuits: Vec<Arc<CircuitBreaker>> = self.circuits.read().values().cloned().collect();
        for circuit in &circuits {
            circuit.reset();
        }
        info!(count = circuits.len(), "all circuits reset");
        circuits.len()
    }

    /// Force one circuit open. Returns `false` if it does not exist.
    pub fn force_open(&self, id: &str) -> bool {
        self.get(id).is_some_and(|c| {
            c.force_open();
            true
        })
    }

    pub fn len(&self) -> usize {
        self.circuits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.read().is_empty()
    }
}

impl Default for CircuitRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitRegistry")
            .field("circuits", &self.circuit_ids())
            .finish_non_exhaustive()
    }
}
