//! Wire Error Codes
//!
//! The error taxonomy shared by all three RPC services. Responses carry one
//! of these codes in the payload; clients use [`ErrorCode::class`] to decide
//! whether to retry, give up, or report a bug.
//!
//! The numeric values match the `ErrorCode` enum in `streamlog.proto`.

use std::fmt;

/// Application-level error code carried in RPC responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidArgument = 1,
    NotFound = 2,
    AlreadyExists = 3,
    FailedPrecondition = 4,
    OutOfRange = 5,
    OffsetOutOfRange = 6,
    ResourceExhausted = 7,
    Internal = 8,
    DataLoss = 9,
    Unavailable = 10,
    Throttled = 11,
    IdempotentReplay = 12,
    NotLeader = 13,
    ReplicationTimeout = 14,
}

/// How a client should react to an error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request succeeded (or was a harmless replay)
    Success,
    /// Safe to retry with backoff; idempotency keys make retries exact
    Retryable,
    /// The request itself is wrong; retrying the same request cannot help
    ClientError,
    /// Broker-side failure; report and surface
    Fatal,
}

impl ErrorCode {
    /// Classify a code for retry decisions.
    ///
    /// `IdempotentReplay` is classified as success: the prior append is the
    /// canonical outcome and the response carries its offset.
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorCode::Ok | ErrorCode::IdempotentReplay => ErrorClass::Success,
            ErrorCode::Unavailable
            | ErrorCode::Throttled
            | ErrorCode::ResourceExhausted
            | ErrorCode::ReplicationTimeout => ErrorClass::Retryable,
            ErrorCode::InvalidArgument
            | ErrorCode::NotFound
            | ErrorCode::AlreadyExists
            | ErrorCode::FailedPrecondition
            | ErrorCode::OutOfRange
            | ErrorCode::OffsetOutOfRange
            | ErrorCode::NotLeader => ErrorClass::ClientError,
            ErrorCode::Internal | ErrorCode::DataLoss => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Decode a wire value; unknown values map to `Internal`.
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => ErrorCode::Ok,
            1 => ErrorCode::InvalidArgument,
            2 => ErrorCode::NotFound,
            3 => ErrorCode::AlreadyExists,
            4 => ErrorCode::FailedPrecondition,
            5 => ErrorCode::OutOfRange,
            6 => ErrorCode::OffsetOutOfRange,
            7 => ErrorCode::ResourceExhausted,
            8 => ErrorCode::Internal,
            9 => ErrorCode::DataLoss,
            10 => ErrorCode::Unavailable,
            11 => ErrorCode::Throttled,
            12 => ErrorCode::IdempotentReplay,
            13 => ErrorCode::NotLeader,
            14 => ErrorCode::ReplicationTimeout,
            _ => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Ok => "OK",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::OffsetOutOfRange => "OFFSET_OUT_OF_RANGE",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::DataLoss => "DATA_LOSS",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Throttled => "THROTTLED",
            ErrorCode::IdempotentReplay => "IDEMPOTENT_REPLAY",
            ErrorCode::NotLeader => "NOT_LEADER",
            ErrorCode::ReplicationTimeout => "REPLICATION_TIMEOUT",
        };
        f.write_str(name)
    }
}
