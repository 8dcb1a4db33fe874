//! StreamLog Storage
//!
//! The append-only segmented log engine behind every StreamLog partition.
//!
//! ## Layout on disk
//!
//! ```text
//! <log_dir>/<topic>/<partition>/
//!     00000000000000000000.log     segment header + CRC-framed batches
//!     00000000000000000000.index   flat array of 20-byte index entries
//!     00000000000000000001.log
//!     00000000000000000001.index
//!     MANIFEST                     key: value lines (offsets, high watermark)
//!     high_water_mark              legacy single-integer companion
//! ```
//!
//! ## Pieces
//!
//! - [`Segment`] - one `.log`/`.index` pair: locked appends, byte-budgeted
//!   reads, fdatasync policy, and crash tail-recovery on open
//! - [`ManifestStore`] - the tiny per-partition `MANIFEST` file
//! - [`LogDir`] - the (topic, partition) → ordered-segments map: rolling,
//!   high watermarks, retention cleanup
//! - [`FlushPolicy`] - when segment files are fsynced
//!
//! Lock ordering is `LogDir` → `Segment`; a task holding a segment lock never
//! takes the directory lock.

pub mod error;
pub mod flush;
pub mod log_dir;
pub mod manifest;
pub mod segment;

pub use error::{Error, Result};
pub use flush::FlushPolicy;
pub use log_dir::{LogDir, LogDirConfig};
pub use manifest::{ManifestStore, PartitionManifest};
pub use segment::{IndexEntry, ReadResult, Segment, SegmentHeader};
