//! Append-Only Segment
//!
//! A segment is one `.log` file plus its `.index` sidecar - the unit of
//! rolling and retention within a partition.
//!
//! ## Log file structure
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ SegmentHeader (24 bytes)                     │
//! │ - base_offset (i64 LE)                       │
//! │ - timestamp_ms (i64 LE)                      │
//! │ - magic 0xDEADBEEF (u32 LE)                  │
//! │ - version 1 (u32 LE)                         │
//! ├──────────────────────────────────────────────┤
//! │ RecordBatch frame (CRC-protected)            │
//! ├──────────────────────────────────────────────┤
//! │ RecordBatch frame                            │
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Index file structure
//!
//! One 20-byte entry per appended batch, sorted by relative offset:
//! `relative_offset (i64 LE) | file_position (i64 LE) | batch_size (i32 LE)`.
//! The whole index is loaded into memory on open; reads binary-search it to
//! find the batch covering a requested offset.
//!
//! ## Crash recovery
//!
//! Opening a segment re-validates it end to end: every indexed batch is
//! re-read and CRC-checked in order, then the unindexed tail is parsed
//! forward frame by frame. The walk stops at the first truncated header,
//! truncated body, implausible frame (larger than the configured max batch
//! size), or CRC mismatch. The log is truncated to the last valid byte and
//! the index rewritten to exactly the surviving batches, so that after open:
//!
//! - the log file ends at the last byte of the last CRC-valid batch,
//! - the index holds one entry per surviving batch,
//! - `end_offset` equals the last batch's base offset plus its record count.
//!
//! A CRC-valid batch is never discarded.
//!
//! ## Concurrency
//!
//! All mutable state lives behind one async mutex; the order appends acquire
//! it is the order offsets are assigned. Reads take the same lock, so a fetch
//! observes a consistent snapshot of `end_offset` and never sees a batch that
//! is mid-write.

use std::path::{Path, PathBuf};
use std::time::Instant;

use streamlog_core::{Record, RecordBatch};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::flush::FlushPolicy;
use crate::manifest::ManifestStore;

/// Magic word identifying a StreamLog segment file
pub const SEGMENT_MAGIC: u32 = 0xDEAD_BEEF;

/// Current segment format version
pub const SEGMENT_VERSION: u32 = 1;

/// Size of the on-disk segment header
pub const SEGMENT_HEADER_SIZE: u64 = 24;

/// Size of one on-disk index entry
pub const INDEX_ENTRY_SIZE: usize = 20;

/// Fixed header at offset 0 of every log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub base_offset: i64,
    pub timestamp_ms: i64,
    pub magic: u32,
    pub version: u32,
}

impl SegmentHeader {
    pub fn new(base_offset: i64, timestamp_ms: i64) -> Self {
        Self {
            base_offset,
            timestamp_ms,
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
        }
    }

    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE as usize] {
        let mut buf = [0u8; SEGMENT_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.base_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[16..20].copy_from_slice(&self.magic.to_le_bytes());
        buf[20..24].copy_from_slice(&self.version.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SEGMENT_HEADER_SIZE as usize {
            return Err(Error::DataLoss("truncated segment header".to_string()));
        }
        let header = Self {
            base_offset: i64::from_le_bytes(data[0..8].try_into().unwrap()),
            timestamp_ms: i64::from_le_bytes(data[8..16].try_into().unwrap()),
            magic: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            version: u32::from_le_bytes(data[20..24].try_into().unwrap()),
        };
        if header.magic != SEGMENT_MAGIC {
            return Err(Error::DataLoss(format!(
                "invalid segment magic {:#x}",
                header.magic
            )));
        }
        if header.version != SEGMENT_VERSION {
            return Err(Error::DataLoss(format!(
                "unsupported segment version {}",
                header.version
            )));
        }
        Ok(header)
    }
}

/// Sparse index entry: one per appended batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// First record offset of the batch, relative to the segment base
    pub relative_offset: i64,

    /// Byte position of the batch frame in the log file
    pub file_position: i64,

    /// Serialized size of the batch frame
    pub batch_size: i32,
}

impl IndexEntry {
    pub fn encode(&self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.relative_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.file_position.to_le_bytes());
        buf[16..20].copy_from_slice(&self.batch_size.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < INDEX_ENTRY_SIZE {
            return None;
        }
        Some(Self {
            relative_offset: i64::from_le_bytes(data[0..8].try_into().unwrap()),
            file_position: i64::from_le_bytes(data[8..16].try_into().unwrap()),
            batch_size: i32::from_le_bytes(data[16..20].try_into().unwrap()),
        })
    }
}

/// Outcome of a byte-budgeted read
#[derive(Debug, Default)]
pub struct ReadResult {
    /// Whole batches, in offset order. The first batch may begin before the
    /// requested offset; the caller filters if it needs record granularity.
    pub batches: Vec<RecordBatch>,

    /// A batch failed CRC or structural validation mid-read; `batches` holds
    /// everything that validated before the bad frame.
    pub corruption_detected: bool,
}

struct SegmentInner {
    log: File,
    index: File,
    log_position: u64,
    index_position: u64,
    end_offset: i64,
    entries: Vec<IndexEntry>,
    closed: bool,
    full: bool,
}

/// One append-only log/index file pair
pub struct Segment {
    log_path: PathBuf,
    index_path: PathBuf,
    base_offset: i64,
    max_size_bytes: u64,
    max_batch_size_bytes: u64,
    flush_policy: FlushPolicy,
    manifest: ManifestStore,
    opened_at: Instant,
    inner: Mutex<SegmentInner>,
}

impl Segment {
    /// Create a fresh segment: writes the header, truncates the index.
    pub async fn create(
        log_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        base_offset: i64,
        max_size_bytes: u64,
        max_batch_size_bytes: u64,
        flush_policy: FlushPolicy,
    ) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();
        let index_path = index_path.as_ref().to_path_buf();

        let mut log = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&log_path)
            .await?;
        let index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&index_path)
            .await?;

        let header = SegmentHeader::new(base_offset, chrono::Utc::now().timestamp_millis());
        log.write_all(&header.encode()).await?;

        let manifest = ManifestStore::new(partition_dir(&log_path));

        debug!(path = %log_path.display(), base_offset, "segment created");

        Ok(Self {
            log_path,
            index_path,
            base_offset,
            max_size_bytes,
            max_batch_size_bytes,
            flush_policy,
            manifest,
            opened_at: Instant::now(),
            inner: Mutex::new(SegmentInner {
                log,
                index,
                log_position: SEGMENT_HEADER_SIZE,
                index_position: 0,
                end_offset: base_offset,
                entries: Vec::new(),
                closed: false,
                full: false,
            }),
        })
    }

    /// Open an existing segment and run tail recovery.
    pub async fn open(
        log_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        max_size_bytes: u64,
        max_batch_size_bytes: u64,
        flush_policy: FlushPolicy,
    ) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();
        let index_path = index_path.as_ref().to_path_buf();

        let mut log = OpenOptions::new().read(true).write(true).open(&log_path).await?;
        // A missing index is rebuilt from the log during recovery
        let mut index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)
            .await?;

        let mut header_buf = [0u8; SEGMENT_HEADER_SIZE as usize];
        log.seek(SeekFrom::Start(0)).await?;
        let read = read_up_to(&mut log, &mut header_buf).await?;
        let header = SegmentHeader::decode(&header_buf[..read])?;

        let loaded_entries = load_index_entries(&mut index).await?;
        let manifest = ManifestStore::new(partition_dir(&log_path));

        let mut segment = Self {
            log_path,
            index_path,
            base_offset: header.base_offset,
            max_size_bytes,
            max_batch_size_bytes,
            flush_policy,
            manifest,
            opened_at: Instant::now(),
            inner: Mutex::new(SegmentInner {
                log,
                index,
                log_position: SEGMENT_HEADER_SIZE,
                index_position: 0,
                end_offset: header.base_offset,
                entries: loaded_entries,
                closed: false,
                full: false,
            }),
        };

        segment.recover_tail().await?;
        Ok(segment)
    }

    /// Tail recovery: validate indexed batches, scan the unindexed tail,
    /// truncate the log at the last CRC-valid byte, rewrite the index.
    async fn recover_tail(&mut self) -> Result<()> {
        let inner = self.inner.get_mut();
        let file_len = inner.log.metadata().await?.len();

        let mut surviving: Vec<IndexEntry> = Vec::with_capacity(inner.entries.len());
        let mut valid_end = SEGMENT_HEADER_SIZE;
        let mut end_offset = self.base_offset;

        // Phase 1: walk the index, verifying contiguity and CRC of each
        // referenced batch.
        let loaded = std::mem::take(&mut inner.entries);
        for entry in &loaded {
            if entry.batch_size <= 0
                || entry.file_position != valid_end as i64
                || entry.relative_offset != end_offset - self.base_offset
            {
                break;
            }
            let frame_end = entry.file_position as u64 + entry.batch_size as u64;
            if frame_end > file_len {
                break;
            }
            let data =
                read_exact_at(&mut inner.log, entry.file_position as u64, entry.batch_size as usize)
                    .await?;
            let Ok((batch, consumed)) = RecordBatch::decode(&data) else {
                break;
            };
            if consumed != entry.batch_size as usize || batch.base_offset != end_offset {
                break;
            }
            surviving.push(*entry);
            valid_end = frame_end;
            end_offset = batch.end_offset();
        }

        // Phase 2: parse forward past the last valid indexed byte for batches
        // the index missed (e.g. crash between log write and index write).
        loop {
            let remaining = file_len.saturating_sub(valid_end);
            if remaining == 0 {
                break;
            }
            let window = remaining.min(self.max_batch_size_bytes) as usize;
            let data = read_exact_at(&mut inner.log, valid_end, window).await?;
            let Ok((batch, consumed)) = RecordBatch::decode(&data) else {
                break;
            };
            if consumed as u64 > self.max_batch_size_bytes || batch.base_offset != end_offset {
                break;
            }
            surviving.push(IndexEntry {
                relative_offset: batch.base_offset - self.base_offset,
                file_position: valid_end as i64,
                batch_size: consumed as i32,
            });
            valid_end += consumed as u64;
            end_offset = batch.end_offset();
        }

        if valid_end < file_len {
            warn!(
                path = %self.log_path.display(),
                valid_end,
                file_len,
                truncated = file_len - valid_end,
                "truncating corrupted segment tail"
            );
            inner.log.set_len(valid_end).await?;
        }

        if surviving != loaded {
            inner.index.set_len(0).await?;
            inner.index.seek(SeekFrom::Start(0)).await?;
            for entry in &surviving {
                inner.index.write_all(&entry.encode()).await?;
            }
            inner.index.sync_data().await?;
        }

        inner.index_position = (surviving.len() * INDEX_ENTRY_SIZE) as u64;
        inner.log_position = valid_end;
        inner.end_offset = end_offset;
        inner.entries = surviving;

        info!(
            path = %self.log_path.display(),
            base_offset = self.base_offset,
            end_offset,
            batches = inner.entries.len(),
            "segment opened"
        );
        Ok(())
    }

    /// Append records as one batch. Returns the offset assigned to the first
    /// record.
    pub async fn append(&self, records: &[Record]) -> Result<i64> {
        let mut inner = self.inner.lock().await;

        if inner.closed {
            return Err(Error::SegmentClosed);
        }
        if records.is_empty() {
            return Ok(inner.end_offset);
        }

        let batch = RecordBatch::new(
            inner.end_offset,
            records.to_vec(),
            chrono::Utc::now().timestamp_millis(),
        );
        let size = batch.wire_size() as u64;

        if size > self.max_batch_size_bytes {
            return Err(Error::BatchTooLarge {
                size,
                max: self.max_batch_size_bytes,
            });
        }
        if inner.log_position + size > self.max_size_bytes {
            inner.full = true;
            return Err(Error::SegmentFull);
        }

        let frame = batch.encode();
        let write_position = inner.log_position;
        inner.log.seek(SeekFrom::Start(write_position)).await?;
        inner.log.write_all(&frame).await?;

        let entry = IndexEntry {
            relative_offset: inner.end_offset - self.base_offset,
            file_position: write_position as i64,
            batch_size: size as i32,
        };
        let index_position = inner.index_position;
        inner.index.seek(SeekFrom::Start(index_position)).await?;
        inner.index.write_all(&entry.encode()).await?;

        inner.entries.push(entry);
        inner.log_position += size;
        inner.index_position += INDEX_ENTRY_SIZE as u64;
        inner.end_offset += records.len() as i64;

        if self.flush_policy == FlushPolicy::EachBatch {
            inner.log.sync_data().await?;
            inner.index.sync_data().await?;
        }

        // The segments are the authoritative log; a manifest failure is
        // logged, never returned.
        let next_offset = inner.end_offset;
        if let Err(e) = self
            .manifest
            .update_offsets(self.base_offset, next_offset, next_offset)
            .await
        {
            warn!(path = %self.log_path.display(), error = %e, "manifest update failed");
        }

        Ok(batch.base_offset)
    }

    /// Read whole batches starting at the batch covering `from_offset`,
    /// stopping before the batch that would push the response past
    /// `max_bytes`.
    pub async fn read(&self, from_offset: i64, max_bytes: u64) -> Result<ReadResult> {
        let mut inner = self.inner.lock().await;

        if from_offset < self.base_offset || from_offset >= inner.end_offset {
            return Ok(ReadResult::default());
        }

        // Greatest entry whose first offset is <= from_offset
        let partition_point = inner
            .entries
            .partition_point(|e| self.base_offset + e.relative_offset <= from_offset);
        let Some(start) = partition_point.checked_sub(1) else {
            return Ok(ReadResult::default());
        };

        let mut result = ReadResult::default();
        let mut bytes_read: u64 = 0;

        let entries = inner.entries[start..].to_vec();
        for entry in entries {
            if bytes_read + entry.batch_size as u64 > max_bytes {
                break;
            }
            let data =
                read_exact_at(&mut inner.log, entry.file_position as u64, entry.batch_size as usize)
                    .await?;
            match RecordBatch::decode(&data) {
                Ok((batch, _)) => {
                    bytes_read += entry.batch_size as u64;
                    result.batches.push(batch);
                }
                Err(_) => {
                    result.corruption_detected = true;
                    break;
                }
            }
        }

        Ok(result)
    }

    /// fsync both files.
    pub async fn flush(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.log.sync_all().await?;
        inner.index.sync_all().await?;
        Ok(())
    }

    /// Close the segment. Closed segments permit reads, reject appends.
    /// Flushes unless the policy is `Never`.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        if self.flush_policy != FlushPolicy::Never {
            inner.log.sync_all().await?;
            inner.index.sync_all().await?;
        }
        inner.closed = true;
        Ok(())
    }

    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    /// Next offset a future append will receive.
    pub async fn end_offset(&self) -> i64 {
        self.inner.lock().await.end_offset
    }

    /// Bytes written to the log file (header included).
    pub async fn size(&self) -> u64 {
        self.inner.lock().await.log_position
    }

    pub async fn is_full(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.full || inner.log_position >= self.max_size_bytes
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Time since this segment was created or opened.
    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

fn partition_dir(log_path: &Path) -> PathBuf {
    log_path.parent().map(Path::to_path_buf).unwrap_or_default()
}

async fn load_index_entries(index: &mut File) -> Result<Vec<IndexEntry>> {
    index.seek(SeekFrom::Start(0)).await?;
    let mut raw = Vec::new();
    index.read_to_end(&mut raw).await?;

    // A partial trailing entry (crash mid index write) is ignored; recovery
    // rebuilds it from the log.
    let mut entries = Vec::with_capacity(raw.len() / INDEX_ENTRY_SIZE);
    for chunk in raw.chunks_exact(INDEX_ENTRY_SIZE) {
        if let Some(entry) = IndexEntry::decode(chunk) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

async fn read_exact_at(file: &mut File, position: u64, len: usize) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(position)).await?;
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            buf.truncate(filled);
            break;
        }
        filled += n;
    }
    Ok(buf)
}

async fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
