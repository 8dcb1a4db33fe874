//! StreamLog Coordinator
//!
//! Consumer-group management: membership with heartbeat liveness, a
//! deterministic partition-assignment state machine, and the per-group
//! committed-offset store.
//!
//! Committed offsets live in memory only; a coordinator restart forgets
//! them and consumers resume from offset 0 (or wherever their own
//! bookkeeping points). See the `GroupManager` docs.

pub mod error;
pub mod group;
pub mod service;

pub use error::{Error, Result};
pub use group::{
    ConsumerGroup, GroupManager, GroupMember, PartitionAssignment, PartitionLookup,
    StaticPartitions,
};
pub use service::CoordinatorService;
