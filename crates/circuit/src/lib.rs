pub mod breaker;
pub mod config;
pub mod error;
pub mod registry;
pub mod retry;

pub use breaker::{
    CALL_RETENTION, CircuitBreaker, CircuitState, CircuitStats, RATE_WINDOW, ServiceCall,
    Transition,
};
pub use config::{CircuitBreakerConfig, CircuitRole};
pub use error::CallError;
pub use registry::CircuitRegistry;
pub use retry::{RetryStrategy, with_fallback, with_retry, with_retry_if};
