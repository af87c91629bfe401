/// Audit logging for file change events.
pub mod audit;
/// Configuration management.
pub mod config;
/// Logging setup.
pub mod telemetry;
