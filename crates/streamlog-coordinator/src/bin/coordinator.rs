//! StreamLog Coordinator Daemon
//!
//! Serves the Coordinator gRPC API. Partition counts for rebalancing come
//! from the controller's DescribeTopic; a background sweep evicts members
//! whose session expired.
//!
//! ```bash
//! streamlog-coordinator --config coordinator.yaml
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use streamlog_coordinator::{CoordinatorService, GroupManager, PartitionLookup};
use streamlog_core::CoordinatorConfig;
use streamlog_observability::{logging, metrics, HealthRegistry};
use streamlog_proto::streamlog::controller_client::ControllerClient;
use streamlog_proto::streamlog::coordinator_server::CoordinatorServer;
use streamlog_proto::streamlog::DescribeTopicRequest;
use tonic::transport::Server;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "streamlog-coordinator")]
#[command(about = "StreamLog consumer-group coordinator daemon", long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "STREAMLOG_COORDINATOR_CONFIG")]
    config: Option<std::path::PathBuf>,
}

/// Resolves partition counts by asking the controller.
struct ControllerPartitions {
    endpoint: String,
}

#[async_trait]
impl PartitionLookup for ControllerPartitions {
    async fn partition_count(&self, topic: &str) -> Option<i32> {
        let mut client = match ControllerClient::connect(self.endpoint.clone()).await {
            Ok(client) => client,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "controller unreachable");
                return None;
            }
        };
        let response = client
            .describe_topic(DescribeTopicRequest {
                topic: topic.to_string(),
            })
            .await;
        match response {
            Ok(response) => {
                let body = response.into_inner();
                if body.partitions.is_empty() {
                    debug!(topic, "topic unknown to controller");
                    None
                } else {
                    Some(body.partitions.len() as i32)
                }
            }
            Err(e) => {
                debug!(topic, error = %e, "describe topic failed");
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CoordinatorConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };

    logging::init_logging(&config.log_level);
    info!(id = config.id, "StreamLog coordinator starting");

    let lookup = Arc::new(ControllerPartitions {
        endpoint: format!(
            "http://{}:{}",
            config.controller_host, config.controller_port
        ),
    });
    let groups = Arc::new(GroupManager::new(
        Duration::from_millis(config.session_timeout_ms as u64),
        lookup,
    ));

    // Periodic eviction of members whose session expired
    let sweep_groups = Arc::clone(&groups);
    let sweep_interval = Duration::from_millis(config.cleanup_interval_ms);
    let sweep_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_groups.cleanup_inactive_members().await;
        }
    });

    if config.enable_metrics {
        metrics::register_metrics();
        let health = HealthRegistry::new();
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
    info!(%addr, "coordinator listening");

    Server::builder()
        .add_service(CoordinatorServer::new(CoordinatorService::new(
            groups,
            config.heartbeat_interval_ms,
        )))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("gRPC server")?;

    sweep_handle.abort();
    info!("coordinator stopped");
    Ok(())
}
