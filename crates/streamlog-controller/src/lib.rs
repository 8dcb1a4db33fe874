//! StreamLog Controller
//!
//! The cluster's topic-metadata table: an in-memory map from topic name to
//! partition count and replication settings, plus leader lookup. Partitions
//! are single-replica, so the leader for every partition is the one
//! configured broker.

pub mod error;
pub mod service;
pub mod topics;

pub use error::{Error, Result};
pub use service::ControllerService;
pub use topics::{TopicInfo, TopicManager};
