//! Broker Append/Fetch Core
//!
//! The glue between request validation, the idempotency table, and the
//! segmented log:
//!
//! ```text
//! produce ─→ validate ─→ sequence check ─→ active segment ─→ append
//!                │              │               │ (roll + retry once)
//!                │              └─ replay? answer prior offset
//!                └─ reject, no I/O
//!            then: record sequence, advance high watermark
//!
//! fetch ─→ validate ─→ locate segment by [base, end) ─→ byte-budgeted read
//!                                  │
//!                                  └─ past the end? empty + high watermark,
//!                                     OFFSET_OUT_OF_RANGE beyond it
//! ```
//!
//! Both `ack=Leader` and `ack=Quorum` return after the local append:
//! partitions are single-replica in this implementation, so the two levels
//! are indistinguishable.

use std::sync::Arc;

use streamlog_core::{Record, RecordBatch};
use streamlog_storage::{Error as StorageError, LogDir};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::idempotency::{BoundedIdempotencyTable, ProducerKey};

/// How a produce request concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// Records were appended; `base_offset` is the first assigned offset
    Appended { base_offset: i64 },

    /// The sequence was a replay; `base_offset` is the offset recorded for
    /// the original append (-1 if the original predates the table's memory)
    Replayed { base_offset: i64 },
}

/// A fetch response before protobuf conversion
#[derive(Debug)]
pub struct FetchOutcome {
    pub batches: Vec<RecordBatch>,
    pub high_watermark: i64,

    /// A batch failed validation mid-read; `batches` holds the valid prefix
    pub corruption_detected: bool,
}

/// The broker core shared by the gRPC service and the tests
pub struct Broker {
    log_dir: Arc<LogDir>,
    idempotency: Arc<BoundedIdempotencyTable>,
}

impl Broker {
    pub fn new(log_dir: Arc<LogDir>, idempotency: Arc<BoundedIdempotencyTable>) -> Self {
        Self {
            log_dir,
            idempotency,
        }
    }

    pub fn log_dir(&self) -> &Arc<LogDir> {
        &self.log_dir
    }

    /// Append a batch of records. An empty `producer_id` disables
    /// idempotency tracking.
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<Record>,
        producer_id: &str,
        sequence: i64,
    ) -> Result<ProduceOutcome> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic cannot be empty".to_string()));
        }
        if partition < 0 {
            return Err(Error::InvalidArgument(
                "partition must be non-negative".to_string(),
            ));
        }
        if records.is_empty() {
            return Err(Error::InvalidArgument(
                "records cannot be empty".to_string(),
            ));
        }

        if !producer_id.is_empty() {
            let key = ProducerKey::new(producer_id, topic, partition);
            if !self.idempotency.is_valid_sequence(&key, sequence).await {
                let base_offset = self.idempotency.get_last_offset(&key).await.unwrap_or(-1);
                debug!(
                    topic,
                    partition, producer_id, sequence, base_offset, "idempotent replay"
                );
                return Ok(ProduceOutcome::Replayed { base_offset });
            }
        }

        let record_count = records.len() as i64;
        let base_offset = self.append_with_roll(topic, partition, &records).await?;

        if !producer_id.is_empty() {
            let key = ProducerKey::new(producer_id, topic, partition);
            self.idempotency
                .update_sequence(&key, sequence, base_offset)
                .await;
        }

        // Single replica: appended records are committed immediately
        let high_watermark = base_offset + record_count;
        self.log_dir
            .set_high_watermark(topic, partition, high_watermark)
            .await?;

        Ok(ProduceOutcome::Appended { base_offset })
    }

    /// Append, rolling the segment and retrying exactly once if the active
    /// segment is full or was concurrently closed by another producer's roll.
    async fn append_with_roll(
        &self,
        topic: &str,
        partition: i32,
        records: &[Record],
    ) -> Result<i64> {
        let segment = self.log_dir.get_segment(topic, partition).await?;
        match segment.append(records).await {
            Ok(offset) => Ok(offset),
            Err(StorageError::SegmentFull) | Err(StorageError::SegmentClosed) => {
                warn!(topic, partition, "segment full, rolling");
                streamlog_observability::metrics::SEGMENT_ROLLS_TOTAL
                    .with_label_values(&[topic])
                    .inc();
                let segment = self.log_dir.get_segment(topic, partition).await?;
                Ok(segment.append(records).await?)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Read batches covering `offset`, bounded by `max_bytes`.
    pub async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        max_bytes: i64,
    ) -> Result<FetchOutcome> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic cannot be empty".to_string()));
        }
        if partition < 0 {
            return Err(Error::InvalidArgument(
                "partition must be non-negative".to_string(),
            ));
        }
        if offset < 0 {
            return Err(Error::InvalidArgument(
                "offset must be non-negative".to_string(),
            ));
        }
        if max_bytes <= 0 {
            return Err(Error::InvalidArgument(
                "max_bytes must be positive".to_string(),
            ));
        }

        let high_watermark = self.log_dir.get_high_watermark(topic, partition).await;
        let end_offset = self.log_dir.get_end_offset(topic, partition).await;

        if offset >= end_offset {
            if offset > high_watermark {
                return Err(Error::OffsetOutOfRange { high_watermark });
            }
            // Caught up: nothing new yet
            return Ok(FetchOutcome {
                batches: Vec::new(),
                high_watermark,
                corruption_detected: false,
            });
        }

        let segments = self.log_dir.get_segments(topic, partition).await;
        let mut target = None;
        for segment in &segments {
            if offset >= segment.base_offset() && offset < segment.end_offset().await {
                target = Some(Arc::clone(segment));
                break;
            }
        }
        let Some(segment) = target else {
            // The offset predates the oldest retained segment
            return Err(Error::OffsetOutOfRange { high_watermark });
        };

        let read = segment.read(offset, max_bytes as u64).await?;
        Ok(FetchOutcome {
            batches: read.batches,
            high_watermark,
            corruption_detected: read.corruption_detected,
        })
    }
}
