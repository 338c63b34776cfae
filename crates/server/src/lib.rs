pub mod api;
pub mod config;
pub mod error;
pub mod recovery_factory;
pub mod telemetry;
