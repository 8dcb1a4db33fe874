//! StreamLog Core
//!
//! Core types shared by every StreamLog component:
//!
//! - [`Record`] - the unit of data in a partition
//! - [`RecordBatch`] - a CRC-framed group of records, the unit of appending
//!   and of on-disk framing
//! - [`ErrorCode`] - the wire error taxonomy with retryability classification
//! - Configuration types for the broker, controller, and coordinator daemons
//!
//! The wire codec in [`batch`] defines the exact byte layout of records and
//! batches inside segment files. Everything is little-endian.

pub mod batch;
pub mod code;
pub mod config;
pub mod error;
pub mod record;

pub use batch::RecordBatch;
pub use code::{ErrorClass, ErrorCode};
pub use config::{BrokerConfig, ControllerConfig, CoordinatorConfig};
pub use error::{Error, Result};
pub use record::Record;
