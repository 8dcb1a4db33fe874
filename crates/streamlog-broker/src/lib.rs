//! StreamLog Broker
//!
//! The data plane: validated, idempotent appends into the segmented log and
//! offset-addressed fetches out of it.
//!
//! ## Pieces
//!
//! - [`BoundedIdempotencyTable`] - per (producer, topic, partition) sequence
//!   tracking with LRU capacity and TTL bounds
//! - [`Broker`] - the append/fetch core gluing validation, deduplication,
//!   segment lookup/rolling, and high-watermark advancement together
//! - [`BrokerService`] - the tonic service exposing Produce and Fetch
//! - [`MaintenanceTask`] - background retention cleanup and age-based rolls

pub mod broker;
pub mod error;
pub mod idempotency;
pub mod service;
pub mod tasks;

pub use broker::{Broker, FetchOutcome, ProduceOutcome};
pub use error::{Error, Result};
pub use idempotency::{BoundedIdempotencyTable, ProducerKey};
pub use service::BrokerService;
pub use tasks::MaintenanceTask;
