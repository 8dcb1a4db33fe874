//! StreamLog Broker Daemon
//!
//! Opens (or initializes) the log directory, recovers every partition, and
//! serves the Broker gRPC API until SIGINT.
//!
//! ```bash
//! streamlog-broker --config broker.yaml
//! ```
//!
//! With no `--config`, every setting takes its default (see
//! `streamlog_core::config::BrokerConfig`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use streamlog_broker::{BoundedIdempotencyTable, Broker, BrokerService, MaintenanceTask};
use streamlog_core::BrokerConfig;
use streamlog_observability::{logging, metrics, HealthRegistry};
use streamlog_proto::streamlog::broker_server::BrokerServer;
use streamlog_storage::{FlushPolicy, LogDir, LogDirConfig};
use tonic::transport::Server;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "streamlog-broker")]
#[command(about = "StreamLog broker daemon", long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "STREAMLOG_BROKER_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BrokerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BrokerConfig::default(),
    };

    logging::init_logging(&config.log_level);
    info!(id = config.id, "StreamLog broker starting");
    info!(
        log_dir = %config.log_dir.display(),
        max_segment_size_bytes = config.max_segment_size_bytes,
        flush_policy = %config.flush_policy,
        retention_bytes = config.retention_bytes,
        "storage configuration"
    );
    if config.replication_factor > 1 {
        warn!(
            replication_factor = config.replication_factor,
            min_insync_replicas = config.min_insync_replicas,
            "replication is configured but not implemented; partitions are single-replica \
             and ack=quorum behaves as ack=leader"
        );
    }

    let flush_policy: FlushPolicy = config
        .flush_policy
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let log_dir = Arc::new(
        LogDir::open(LogDirConfig {
            root: config.log_dir.clone(),
            max_segment_size_bytes: config.max_segment_size_bytes,
            max_batch_size_bytes: config.max_batch_size_bytes,
            flush_policy,
        })
        .await
        .context("opening log directory")?,
    );
    info!(topics = log_dir.list_topics().await.len(), "log directory recovered");

    let idempotency = Arc::new(BoundedIdempotencyTable::new(
        config.idempotency_max_entries,
        Duration::from_millis(config.idempotency_ttl_ms),
    ));
    let broker = Arc::new(Broker::new(Arc::clone(&log_dir), idempotency));

    // Background retention + age-roll sweep
    let maintenance = MaintenanceTask::new(
        Arc::clone(&log_dir),
        config.retention_bytes,
        Duration::from_millis(config.segment_roll_interval_ms),
        Duration::from_millis(config.retention_check_interval_ms),
    );
    let maintenance_handle = tokio::spawn(maintenance.run());

    // Health + metrics listener
    if config.enable_metrics {
        metrics::register_metrics();
        let health = HealthRegistry::new();
        let data_dir = config.log_dir.clone();
        health.register("log_dir", move || data_dir.is_dir());
        let addr: std::net::SocketAddr = format!("{}:{}", config.host, config.metrics_port)
            .parse()
            .context("metrics address")?;
        tokio::spawn(async move {
            if let Err(e) = streamlog_observability::serve_health(addr, health).await {
                warn!(error = %e, "health server exited");
            }
        });
    }

    let addr: std::net::SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("listen address")?;
    info!(%addr, "broker listening");

    Server::builder()
        .add_service(BrokerServer::new(BrokerService::new(broker)))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("gRPC server")?;

    maintenance_handle.abort();
    log_dir.flush_all().await.context("flushing segments")?;
    info!("broker stopped");
    Ok(())
}
