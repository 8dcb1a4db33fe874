//! Record Data Structure
//!
//! This module defines the core `Record` type - the fundamental unit of data
//! in StreamLog.
//!
//! ## What is a Record?
//! A record is a single message/event in a partition, similar to:
//! - A Kafka message
//! - A log entry
//! - An event in an event stream
//!
//! ## Structure
//! Each record contains:
//! - **key**: Identifier for partitioning/grouping (may be empty)
//! - **value**: The actual payload (arbitrary bytes)
//! - **timestamp_ms**: When the record was created (milliseconds since epoch)
//!
//! Records do not carry their own offset: offsets are assigned by the segment
//! at append time, and the batch's `base_offset` plus the record's position
//! inside the batch determines the record's offset.
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for zero-copy operations (no allocations when slicing)
//! - Key is a plain byte string; an empty key means "no key"
//! - Timestamp is i64 to match the on-disk wire format

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single record in a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record key (empty means no key)
    pub key: Bytes,

    /// Value (payload)
    pub value: Bytes,

    /// Timestamp in milliseconds since epoch
    pub timestamp_ms: i64,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes, timestamp_ms: i64) -> Self {
        Self {
            key,
            value,
            timestamp_ms,
        }
    }

    /// Exact number of bytes this record occupies on the wire:
    /// `key_len:i32 | key | value_len:i32 | value | timestamp:i64`.
    pub fn wire_size(&self) -> usize {
        4 + self.key.len() + 4 + self.value.len() + 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    #[test]
    fn test_new_with_key() {
        let rec = Record::new(
            Bytes::from("my-key"),
            Bytes::from("hello world"),
            1_700_000_000_000,
        );
        assert_eq!(rec.key, Bytes::from("my-key"));
        assert_eq!(rec.value, Bytes::from("hello world"));
        assert_eq!(rec.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_new_without_key() {
        let rec = Record::new(Bytes::new(), Bytes::from("payload"), 0);
        assert!(rec.key.is_empty());
        assert_eq!(rec.value, Bytes::from("payload"));
    }

    #[test]
    fn test_new_with_empty_value() {
        let rec = Record::new(Bytes::from("k"), Bytes::new(), 1);
        assert!(rec.value.is_empty());
    }

    #[test]
    fn test_new_preserves_binary_value() {
        let value = Bytes::from(vec![0u8, 1, 2, 127, 128, 255]);
        let rec = Record::new(Bytes::new(), value.clone(), 0);
        assert_eq!(rec.value, value);
    }

    // ---------------------------------------------------------------
    // wire_size
    // ---------------------------------------------------------------

    #[test]
    fn test_wire_size_no_key() {
        let rec = Record::new(Bytes::new(), Bytes::from("12345"), 0);
        // 4 (key len) + 0 + 4 (value len) + 5 + 8 (timestamp) = 21
        assert_eq!(rec.wire_size(), 21);
    }

    #[test]
    fn test_wire_size_with_key() {
        let rec = Record::new(Bytes::from("abc"), Bytes::from("12345"), 0);
        // 4 + 3 + 4 + 5 + 8 = 24
        assert_eq!(rec.wire_size(), 24);
    }

    #[test]
    fn test_wire_size_empty_record() {
        let rec = Record::new(Bytes::new(), Bytes::new(), 0);
        assert_eq!(rec.wire_size(), 16);
    }

    #[test]
    fn test_wire_size_large_payload() {
        let big = Bytes::from(vec![0u8; 1_000_000]);
        let rec = Record::new(Bytes::new(), big, 0);
        assert_eq!(rec.wire_size(), 16 + 1_000_000);
    }

    // ---------------------------------------------------------------
    // Clone / PartialEq
    // ---------------------------------------------------------------

    #[test]
    fn test_clone_independence() {
        let rec = Record::new(Bytes::from("key"), Bytes::from("val"), 2);
        let cloned = rec.clone();
        assert_eq!(rec, cloned);
    }

    #[test]
    fn test_ne_different_key() {
        let a = Record::new(Bytes::from("a"), Bytes::from("v"), 1);
        let b = Record::new(Bytes::from("b"), Bytes::from("v"), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ne_different_value() {
        let a = Record::new(Bytes::from("k"), Bytes::from("x"), 1);
        let b = Record::new(Bytes::from("k"), Bytes::from("y"), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ne_different_timestamp() {
        let a = Record::new(Bytes::from("k"), Bytes::from("v"), 1);
        let b = Record::new(Bytes::from("k"), Bytes::from("v"), 2);
        assert_ne!(a, b);
    }

    // ---------------------------------------------------------------
    // Serde round-trip (JSON, used by the CLI consumer output)
    // ---------------------------------------------------------------

    #[test]
    fn test_serde_roundtrip() {
        let rec = Record::new(
            Bytes::from("user-123"),
            Bytes::from(r#"{"action":"click"}"#),
            1_700_000_000_000,
        );
        let json = serde_json::to_string(&rec).expect("serialize");
        let deserialized: Record = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(rec, deserialized);
    }

    #[test]
    fn test_serde_roundtrip_binary_value() {
        let rec = Record::new(Bytes::new(), Bytes::from(vec![0u8, 1, 2, 255, 254]), 20);
        let json = serde_json::to_string(&rec).expect("serialize");
        let deserialized: Record = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(rec, deserialized);
    }
}
