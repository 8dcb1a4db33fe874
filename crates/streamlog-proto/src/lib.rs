//! StreamLog Protocol Buffer Definitions
//!
//! gRPC service definitions and message types for communication between
//! StreamLog components.
//!
//! ## Services
//!
//! - **Broker** (default port 9092): the data plane
//!   - `Produce` - append a batch of records to a topic/partition
//!   - `Fetch` - read batches by offset within a byte budget
//!
//! - **Controller** (default port 9093): topic metadata
//!   - `CreateTopic`, `DescribeTopic`, `ListTopics`, `FindLeader`
//!
//! - **Coordinator** (default port 9095): consumer groups
//!   - `PollAssignment` - join + heartbeat + fetch assignments in one RPC
//!   - `CommitOffset`, `GetCommittedOffset`
//!
//! ## Usage
//!
//! ```ignore
//! use streamlog_proto::streamlog::broker_client::BrokerClient;
//! use streamlog_proto::streamlog::{ProduceRequest, Record};
//!
//! let mut client = BrokerClient::connect("http://localhost:9092").await?;
//! let response = client
//!     .produce(ProduceRequest {
//!         topic: "orders".to_string(),
//!         partition: 0,
//!         records: vec![Record {
//!             key: b"user-1".to_vec(),
//!             value: b"{\"amount\": 10}".to_vec(),
//!             timestamp_ms: 0,
//!         }],
//!         producer_id: String::new(),
//!         sequence: 0,
//!         ack: 0,
//!     })
//!     .await?;
//! println!("base offset: {}", response.into_inner().base_offset);
//! ```

/// Generated types for the `streamlog.v1` package
pub mod streamlog {
    tonic::include_proto!("streamlog.v1");
}
