//! StreamLog Controller Daemon
//!
//! Serves the Controller gRPC API: topic creation, description, listing,
//! and leader lookup.
//!
//! ```bash
//! streamlog-controller --config controller.yaml
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use streamlog_controller::service::BrokerLocation;
use streamlog_controller::{ControllerService, TopicManager};
use streamlog_core::ControllerConfig;
use streamlog_observability::{logging, metrics, HealthRegistry};
use streamlog_proto::streamlog::controller_server::ControllerServer;
use tonic::transport::Server;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "streamlog-controller")]
#[command(about = "StreamLog controller daemon", long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "STREAMLOG_CONTROLLER_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ControllerConfig::default(),
    };

    logging::init_logging(&config.log_level);
    info!(id = config.id, "StreamLog controller starting");

    let topics = Arc::new(TopicManager::new());
    let broker = BrokerLocation {
        broker_id: config.id,
        host: config.broker_host.clone(),
        port: config.broker_port,
    };

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
    info!(%addr, "controller listening");

    Server::builder()
        .add_service(ControllerServer::new(ControllerService::new(topics, broker)))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("gRPC server")?;

    info!("controller stopped");
    Ok(())
}
