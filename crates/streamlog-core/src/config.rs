//! Service Configuration
//!
//! YAML configuration for the three StreamLog daemons. Files are plain
//! `key: value` documents; every key has a default so a partial (or empty)
//! file is valid.
//!
//! ```yaml
//! # broker.yaml
//! id: 1
//! host: 0.0.0.0
//! port: 9092
//! log_dir: ./data/log
//! max_segment_size_bytes: 134217728
//! flush_policy: on_roll
//! enable_metrics: true
//! metrics_port: 9094
//! log_level: info
//! ```
//!
//! `replication_factor` and `min_insync_replicas` are accepted and logged but
//! not acted upon: partitions are single-replica in this implementation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Broker daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker id reported by FindLeader
    #[serde(default = "default_broker_id")]
    pub id: i32,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// Root of the partition directory tree
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Roll the active segment when it reaches this size (default: 128MB)
    #[serde(default = "default_max_segment_size_bytes")]
    pub max_segment_size_bytes: u64,

    /// Roll a non-empty active segment after this age even if not full
    #[serde(default = "default_segment_roll_interval_ms")]
    pub segment_roll_interval_ms: u64,

    /// Reject a single batch larger than this; also bounds the tail-recovery
    /// frame walk (default: 1MB)
    #[serde(default = "default_max_batch_size_bytes")]
    pub max_batch_size_bytes: u64,

    #[serde(default = "default_max_inflight_bytes")]
    pub max_inflight_bytes: u64,

    /// When to fdatasync segment files: never | on_roll | each_batch
    #[serde(default = "default_flush_policy")]
    pub flush_policy: String,

    /// Per-partition byte budget for retention cleanup
    #[serde(default = "default_retention_bytes")]
    pub retention_bytes: u64,

    #[serde(default = "default_retention_check_interval_ms")]
    pub retention_check_interval_ms: u64,

    /// Idempotency table capacity (producer, topic, partition) entries
    #[serde(default = "default_idempotency_max_entries")]
    pub idempotency_max_entries: usize,

    /// Idempotency entries untouched this long are dropped
    #[serde(default = "default_idempotency_ttl_ms")]
    pub idempotency_ttl_ms: u64,

    /// Declared but unimplemented; partitions are single-replica
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,

    #[serde(default = "default_min_insync_replicas")]
    pub min_insync_replicas: i32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_replication_timeout_ms")]
    pub replication_timeout_ms: u64,

    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,

    #[serde(default = "default_broker_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes")
    }
}

impl BrokerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_yaml(path.as_ref())
    }
}

/// Controller daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_broker_id")]
    pub id: i32,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_controller_port")]
    pub port: u16,

    /// Advertised broker address handed out by FindLeader
    #[serde(default = "default_host")]
    pub broker_host: String,

    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,

    #[serde(default = "default_controller_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes")
    }
}

impl ControllerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_yaml(path.as_ref())
    }
}

/// Coordinator daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_broker_id")]
    pub id: i32,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_coordinator_port")]
    pub port: u16,

    /// Controller address for partition-count lookups during rebalance
    #[serde(default = "default_host")]
    pub controller_host: String,

    #[serde(default = "default_controller_port")]
    pub controller_port: u16,

    /// Interval clients are told to heartbeat at (via PollAssignment)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: i32,

    /// A member missing heartbeats this long is presumed dead
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: i32,

    /// Cadence of the inactive-member sweep
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,

    #[serde(default = "default_coordinator_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config deserializes")
    }
}

impl CoordinatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_yaml(path.as_ref())
    }
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

fn default_broker_id() -> i32 {
    1
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    9092
}

fn default_controller_port() -> u16 {
    9093
}

fn default_coordinator_port() -> u16 {
    9095
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./data/log")
}

fn default_max_segment_size_bytes() -> u64 {
    128 * 1024 * 1024 // 128MB
}

fn default_segment_roll_interval_ms() -> u64 {
    10 * 60 * 1000 // 10 minutes
}

fn default_max_batch_size_bytes() -> u64 {
    1024 * 1024 // 1MB
}

fn default_max_inflight_bytes() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_flush_policy() -> String {
    "on_roll".to_string()
}

fn default_retention_bytes() -> u64 {
    1024 * 1024 * 1024 // 1GB per partition
}

fn default_retention_check_interval_ms() -> u64 {
    60 * 1000
}

fn default_idempotency_max_entries() -> usize {
    100_000
}

fn default_idempotency_ttl_ms() -> u64 {
    15 * 60 * 1000 // 15 minutes
}

fn default_replication_factor() -> i32 {
    1
}

fn default_min_insync_replicas() -> i32 {
    1
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_replication_timeout_ms() -> u64 {
    10_000
}

fn default_enable_metrics() -> bool {
    false
}

fn default_broker_metrics_port() -> u16 {
    9094
}

fn default_controller_metrics_port() -> u16 {
    9096
}

fn default_coordinator_metrics_port() -> u16 {
    9097
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_interval_ms() -> i32 {
    3_000
}

fn default_session_timeout_ms() -> i32 {
    30_000
}

fn default_cleanup_interval_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_broker_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, 9092);
        assert_eq!(config.max_segment_size_bytes, 128 * 1024 * 1024);
        assert_eq!(config.max_batch_size_bytes, 1024 * 1024);
        assert_eq!(config.flush_policy, "on_roll");
        assert_eq!(config.replication_factor, 1);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_broker_load_partial_file() {
        let file = write_config(
            "port: 7000\nlog_dir: /tmp/streamlog\nmax_segment_size_bytes: 1024\nflush_policy: each_batch\n",
        );
        let config = BrokerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/streamlog"));
        assert_eq!(config.max_segment_size_bytes, 1024);
        assert_eq!(config.flush_policy, "each_batch");
        // Unspecified keys fall back to defaults
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_broker_load_with_comments_and_quotes() {
        let file = write_config("# broker settings\nhost: \"0.0.0.0\"\nid: 3\n");
        let config = BrokerConfig::load(file.path()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.id, 3);
    }

    #[test]
    fn test_broker_load_missing_file() {
        let err = BrokerConfig::load("/nonexistent/broker.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_broker_load_malformed_yaml() {
        let file = write_config("port: [not a number\n");
        let err = BrokerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.port, 9093);
        assert_eq!(config.broker_port, 9092);
    }

    #[test]
    fn test_coordinator_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.port, 9095);
        assert_eq!(config.heartbeat_interval_ms, 3_000);
        assert_eq!(config.session_timeout_ms, 30_000);
        assert_eq!(config.cleanup_interval_ms, 30_000);
    }

    #[test]
    fn test_coordinator_load() {
        let file = write_config("session_timeout_ms: 5000\ncontroller_port: 9999\n");
        let config = CoordinatorConfig::load(file.path()).unwrap();
        assert_eq!(config.session_timeout_ms, 5000);
        assert_eq!(config.controller_port, 9999);
    }
}
