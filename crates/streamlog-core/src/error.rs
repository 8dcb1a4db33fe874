//! Core Error Types
//!
//! Errors raised by the wire codec and configuration loading.
//!
//! ## Error Categories
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: Segment file doesn't start with the expected magic word
//! - `UnsupportedVersion`: Segment was written by a format version we don't read
//! - `Corrupted`: Framing violation (short buffer, negative length, bad CRC)
//!
//! ### Configuration Errors
//! - `Config`: YAML config file could not be parsed
//!
//! All functions in this crate return `Result<T>`, aliased to
//! `Result<T, Error>`, so callers can propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic word: {0:#x}")]
    InvalidMagic(u32),

    #[error("Unsupported segment version: {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
