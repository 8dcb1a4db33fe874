//! StreamLog Observability
//!
//! The ambient concerns every StreamLog daemon shares:
//!
//! - [`metrics`] - the global Prometheus registry and metric definitions
//! - [`health`] - a registry of named readiness checks
//! - [`server`] - the HTTP listener serving `/live`, `/ready`, `/metrics`
//! - [`logging`] - tracing-subscriber bootstrap honoring the configured level

pub mod health;
pub mod logging;
pub mod metrics;
pub mod server;

pub use health::HealthRegistry;
pub use server::serve_health;
