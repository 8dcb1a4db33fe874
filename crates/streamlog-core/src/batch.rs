//! Record Batch Wire Format
//!
//! A `RecordBatch` is the unit of appending and of on-disk framing. Producers
//! send groups of records; the segment assigns the batch a base offset and
//! writes it as one contiguous, CRC-protected frame:
//!
//! ```text
//! ┌─────────────┬──────────────┬──────────────┬─────────────┬─────────┐
//! │ base_offset │ timestamp_ms │ record_count │ record *    │ crc32   │
//! │ (i64 LE)    │ (i64 LE)     │ (i32 LE)     │ (wire form) │ (u32 LE)│
//! └─────────────┴──────────────┴──────────────┴─────────────┴─────────┘
//!
//! record wire form:
//! ┌──────────┬─────────┬────────────┬───────────┬──────────────┐
//! │ key_len  │ key     │ value_len  │ value     │ timestamp_ms │
//! │ (i32 LE) │ (bytes) │ (i32 LE)   │ (bytes)   │ (i64 LE)     │
//! └──────────┴─────────┴────────────┴───────────┴──────────────┘
//! ```
//!
//! The CRC32 (IEEE, via `crc32fast`) covers every byte of the batch body
//! preceding the CRC field itself. There is no length prefix: [`RecordBatch::decode`]
//! reports how many bytes it consumed, which is what lets segment tail
//! recovery walk frames forward and stop at the first one that doesn't parse
//! or doesn't checksum.
//!
//! Decoding validates every step: enough bytes remaining, a non-negative
//! record count, non-negative key/value lengths that fit in the remaining
//! input, and finally the CRC. Any violation yields [`Error::Corrupted`]; the
//! caller treats the offending position as end-of-valid-data.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::record::Record;

/// Fixed bytes of a batch frame around the records: base_offset (8) +
/// timestamp_ms (8) + record_count (4) + crc32 (4).
pub const BATCH_OVERHEAD: usize = 24;

/// A CRC-framed group of records with an assigned base offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    /// Offset assigned to the first record in the batch
    pub base_offset: i64,

    /// Batch creation time, milliseconds since epoch
    pub timestamp_ms: i64,

    /// The records; never empty for batches produced by an append
    pub records: Vec<Record>,

    /// IEEE CRC32 over the serialized body preceding this field
    pub crc32: u32,
}

impl RecordBatch {
    /// Build a batch and compute its CRC.
    pub fn new(base_offset: i64, records: Vec<Record>, timestamp_ms: i64) -> Self {
        let mut batch = Self {
            base_offset,
            timestamp_ms,
            records,
            crc32: 0,
        };
        batch.crc32 = batch.compute_crc();
        batch
    }

    /// Exact serialized size of this batch in bytes.
    pub fn wire_size(&self) -> usize {
        BATCH_OVERHEAD + self.records.iter().map(Record::wire_size).sum::<usize>()
    }

    /// One past the offset of the last record in the batch.
    pub fn end_offset(&self) -> i64 {
        self.base_offset + self.records.len() as i64
    }

    /// Serialize the batch to its wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.encode_body(&mut buf);
        buf.put_u32_le(self.crc32);
        buf.freeze()
    }

    /// Recompute the CRC over the current body and compare with the stored one.
    pub fn verify_crc(&self) -> bool {
        self.compute_crc() == self.crc32
    }

    fn compute_crc(&self) -> u32 {
        let mut body = BytesMut::with_capacity(self.wire_size() - 4);
        self.encode_body(&mut body);
        crc32fast::hash(&body)
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.base_offset);
        buf.put_i64_le(self.timestamp_ms);
        buf.put_i32_le(self.records.len() as i32);
        for record in &self.records {
            buf.put_i32_le(record.key.len() as i32);
            buf.put_slice(&record.key);
            buf.put_i32_le(record.value.len() as i32);
            buf.put_slice(&record.value);
            buf.put_i64_le(record.timestamp_ms);
        }
    }

    /// Decode one batch from the front of `data`.
    ///
    /// Returns the batch and the number of bytes consumed. `data` may extend
    /// past the end of the batch; trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<(RecordBatch, usize)> {
        let mut cursor = Cursor::new(data);

        let base_offset = cursor.read_i64("base_offset")?;
        let timestamp_ms = cursor.read_i64("timestamp_ms")?;
        let record_count = cursor.read_i32("record_count")?;
        if record_count < 0 {
            return Err(Error::Corrupted(format!(
                "negative record count: {record_count}"
            )));
        }

        let mut records = Vec::with_capacity(record_count.min(1024) as usize);
        for _ in 0..record_count {
            let key = cursor.read_prefixed_bytes("key")?;
            let value = cursor.read_prefixed_bytes("value")?;
            let timestamp_ms = cursor.read_i64("record timestamp")?;
            records.push(Record::new(key, value, timestamp_ms));
        }

        let crc32 = cursor.read_u32("crc32")?;
        let consumed = cursor.position;

        let batch = RecordBatch {
            base_offset,
            timestamp_ms,
            records,
            crc32,
        };
        if !batch.verify_crc() {
            return Err(Error::Corrupted(format!(
                "CRC mismatch for batch at base offset {base_offset}"
            )));
        }

        Ok((batch, consumed))
    }
}

/// Checked little-endian reader over a byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.position;
        if remaining < n {
            return Err(Error::Corrupted(format!(
                "truncated {what}: need {n} bytes, {remaining} remaining"
            )));
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        let bytes = self.take(4, what)?;
        Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_i64(&mut self, what: &str) -> Result<i64> {
        let bytes = self.take(8, what)?;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_prefixed_bytes(&mut self, what: &str) -> Result<Bytes> {
        let len = self.read_i32(what)?;
        if len < 0 {
            return Err(Error::Corrupted(format!("negative {what} length: {len}")));
        }
        let bytes = self.take(len as usize, what)?;
        Ok(Bytes::copy_from_slice(bytes))
    }
}
