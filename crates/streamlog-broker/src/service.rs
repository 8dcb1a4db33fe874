//! gRPC Broker Service
//!
//! Thin tonic layer over [`Broker`]: protobuf conversion, application error
//! codes in the response payload, and per-topic metrics. gRPC status codes
//! are reserved for transport-level problems; every application outcome,
//! including `IDEMPOTENT_REPLAY` and `OFFSET_OUT_OF_RANGE`, travels in the
//! response's `error_code` field the way the CLI and client retries expect.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use streamlog_core::Record;
use streamlog_observability::metrics;
use streamlog_proto::streamlog::broker_server::Broker as BrokerRpc;
use streamlog_proto::streamlog::{
    AckLevel, ErrorCode, FetchRequest, FetchResponse, ProduceRequest, ProduceResponse,
    Record as PbRecord, RecordBatch as PbRecordBatch,
};
use tonic::{Request, Response, Status};
use tracing::{debug, error};

use crate::broker::{Broker, ProduceOutcome};
use crate::error::Error;

/// tonic service wrapping the broker core
pub struct BrokerService {
    broker: Arc<Broker>,
}

impl BrokerService {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

#[tonic::async_trait]
impl BrokerRpc for BrokerService {
    async fn produce(
        &self,
        request: Request<ProduceRequest>,
    ) -> Result<Response<ProduceResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();

        let ack_label = match AckLevel::try_from(req.ack) {
            Ok(AckLevel::AckQuorum) => "quorum",
            _ => "leader",
        };

        let payload_bytes: usize = req
            .records
            .iter()
            .map(|r| r.key.len() + r.value.len())
            .sum();
        let record_count = req.records.len();
        let records: Vec<Record> = req.records.into_iter().map(record_from_pb).collect();

        let outcome = self
            .broker
            .produce(&req.topic, req.partition, records, &req.producer_id, req.sequence)
            .await;

        let response = match outcome {
            Ok(ProduceOutcome::Appended { base_offset }) => {
                metrics::PRODUCE_RECORDS_TOTAL
                    .with_label_values(&[&req.topic])
                    .inc_by(record_count as u64);
                metrics::PRODUCE_BYTES_TOTAL
                    .with_label_values(&[&req.topic])
                    .inc_by(payload_bytes as u64);
                ProduceResponse {
                    base_offset,
                    error_code: ErrorCode::Ok as i32,
                    error_message: String::new(),
                }
            }
            Ok(ProduceOutcome::Replayed { base_offset }) => {
                metrics::IDEMPOTENT_REPLAYS_TOTAL
                    .with_label_values(&[&req.topic])
                    .inc();
                ProduceResponse {
                    base_offset,
                    error_code: ErrorCode::IdempotentReplay as i32,
                    error_message: "sequence already applied".to_string(),
                }
            }
            Err(e) => {
                let (code, message) = classify(&e);
                ProduceResponse {
                    base_offset: -1,
                    error_code: code as i32,
                    error_message: message,
                }
            }
        };

        metrics::PRODUCE_LATENCY
            .with_label_values(&[&req.topic, ack_label])
            .observe(started.elapsed().as_secs_f64());

        Ok(Response::new(response))
    }

    async fn fetch(
        &self,
        request: Request<FetchRequest>,
    ) -> Result<Response<FetchResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();

        let response = match self
            .broker
            .fetch(&req.topic, req.partition, req.offset, req.max_bytes)
            .await
        {
            Ok(outcome) => {
                let record_count: usize = outcome.batches.iter().map(|b| b.records.len()).sum();
                let byte_count: usize = outcome.batches.iter().map(|b| b.wire_size()).sum();
                metrics::FETCH_RECORDS_TOTAL
                    .with_label_values(&[&req.topic])
                    .inc_by(record_count as u64);
                metrics::FETCH_BYTES_TOTAL
                    .with_label_values(&[&req.topic])
                    .inc_by(byte_count as u64);

                let (error_code, error_message) = if outcome.corruption_detected {
                    metrics::CRC_MISMATCHES_TOTAL
                        .with_label_values(&[&req.topic])
                        .inc();
                    error!(
                        topic = %req.topic,
                        partition = req.partition,
                        offset = req.offset,
                        "corruption detected mid-read"
                    );
                    (
                        ErrorCode::DataLoss as i32,
                        "corrupted batch encountered; partial result returned".to_string(),
                    )
                } else {
                    (ErrorCode::Ok as i32, String::new())
                };

                FetchResponse {
                    batches: outcome.batches.into_iter().map(batch_to_pb).collect(),
                    high_watermark: outcome.high_watermark,
                    error_code,
                    error_message,
                }
            }
            Err(Error::OffsetOutOfRange { high_watermark }) => {
                debug!(
                    topic = %req.topic,
                    partition = req.partition,
                    offset = req.offset,
                    high_watermark,
                    "fetch beyond end"
                );
                FetchResponse {
                    batches: Vec::new(),
                    high_watermark,
                    error_code: ErrorCode::OffsetOutOfRange as i32,
                    error_message: format!(
                        "offset {} beyond high watermark {high_watermark}",
                        req.offset
                    ),
                }
            }
            Err(e) => {
                let (code, message) = classify(&e);
                FetchResponse {
                    batches: Vec::new(),
                    high_watermark: 0,
                    error_code: code as i32,
                    error_message: message,
                }
            }
        };

        metrics::FETCH_LATENCY
            .with_label_values(&[&req.topic])
            .observe(started.elapsed().as_secs_f64());

        Ok(Response::new(response))
    }
}

/// Map a broker error to a wire code. Internal failures are logged at error
/// level here, exactly once; invalid arguments are not.
fn classify(error: &Error) -> (ErrorCode, String) {
    use streamlog_storage::Error as StorageError;

    match error {
        Error::InvalidArgument(msg) => (ErrorCode::InvalidArgument, msg.clone()),
        Error::OffsetOutOfRange { high_watermark } => (
            ErrorCode::OffsetOutOfRange,
            format!("offset beyond high watermark {high_watermark}"),
        ),
        Error::Storage(StorageError::BatchTooLarge { size, max }) => (
            ErrorCode::InvalidArgument,
            format!("batch of {size} bytes exceeds max batch size {max}"),
        ),
        Error::Storage(StorageError::DataLoss(msg))
        | Error::Storage(StorageError::Corrupted(msg)) => {
            error!(error = %msg, "data loss");
            (ErrorCode::DataLoss, msg.clone())
        }
        Error::Storage(e) => {
            error!(error = %e, "storage failure");
            (ErrorCode::Internal, e.to_string())
        }
        Error::Internal(msg) => {
            error!(error = %msg, "internal failure");
            (ErrorCode::Internal, msg.clone())
        }
    }
}

fn record_from_pb(record: PbRecord) -> Record {
    Record::new(
        Bytes::from(record.key),
        Bytes::from(record.value),
        record.timestamp_ms,
    )
}

fn batch_to_pb(batch: streamlog_core::RecordBatch) -> PbRecordBatch {
    PbRecordBatch {
        base_offset: batch.base_offset,
        timestamp_ms: batch.timestamp_ms,
        crc32: batch.crc32,
        records: batch
            .records
            .into_iter()
            .map(|r| PbRecord {
                key: r.key.to_vec(),
                value: r.value.to_vec(),
                timestamp_ms: r.timestamp_ms,
            })
            .collect(),
    }
}
