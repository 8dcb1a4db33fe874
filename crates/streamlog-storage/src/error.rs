//! Storage Error Types
//!
//! ## Error Categories
//!
//! ### Append-path errors
//! - `SegmentFull`: the batch would push the segment past its size budget;
//!   LogDir translates this into a roll, it is never surfaced to clients
//! - `SegmentClosed`: append raced a roll; the caller retries on the new
//!   active segment
//! - `BatchTooLarge`: a single batch exceeds the configured maximum and
//!   cannot fit in any segment
//!
//! ### Integrity errors
//! - `DataLoss`: bad magic/version, a broken segment chain, or mid-read
//!   corruption
//! - `Corrupted`: framing-level violation bubbled up from the codec
//!
//! ### Manifest errors
//! - `ManifestNotFound` / `ManifestParse`: the per-partition `MANIFEST` is
//!   absent or unreadable; callers rebuild state from the segments, which
//!   are authoritative

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Segment would exceed max size")]
    SegmentFull,

    #[error("Segment is closed")]
    SegmentClosed,

    #[error("Batch of {size} bytes exceeds max batch size {max}")]
    BatchTooLarge { size: u64, max: u64 },

    #[error("Data loss: {0}")]
    DataLoss(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Manifest not found at {0}")]
    ManifestNotFound(String),

    #[error("Manifest parse error: {0}")]
    ManifestParse(String),

    #[error("Partition not found: {topic}/{partition}")]
    PartitionNotFound { topic: String, partition: i32 },
}

impl From<streamlog_core::Error> for Error {
    fn from(err: streamlog_core::Error) -> Self {
        match err {
            streamlog_core::Error::Io(e) => Error::Io(e),
            streamlog_core::Error::InvalidMagic(m) => {
                Error::DataLoss(format!("invalid magic word {m:#x}"))
            }
            streamlog_core::Error::UnsupportedVersion(v) => {
                Error::DataLoss(format!("unsupported segment version {v}"))
            }
            streamlog_core::Error::Corrupted(msg) => Error::Corrupted(msg),
            streamlog_core::Error::Config(msg) => Error::Corrupted(msg),
        }
    }
}
