//! Broker Error Types
//!
//! `InvalidArgument` covers request-shape failures and is rejected before any
//! I/O happens; it is never logged at error level. `OffsetOutOfRange` carries
//! the current high watermark so consumers can reset. Storage errors pass
//! through; the produce path consumes `SegmentFull` internally via the roll
//! path and clients never see it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Offset out of range (high watermark {high_watermark})")]
    OffsetOutOfRange { high_watermark: i64 },

    #[error(transparent)]
    Storage(#[from] streamlog_storage::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
