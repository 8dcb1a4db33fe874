//! Background Maintenance
//!
//! One interval-driven task per broker process:
//!
//! 1. roll any non-empty active segment older than the configured roll
//!    interval, so low-traffic partitions still produce finished segments
//! 2. apply the retention byte budget to every partition
//!
//! The task runs until the shutdown signal fires.

use std::sync::Arc;
use std::time::Duration;

use streamlog_storage::LogDir;
use tracing::{debug, info, warn};

/// Retention and age-roll loop
pub struct MaintenanceTask {
    log_dir: Arc<LogDir>,
    retention_bytes: u64,
    roll_max_age: Duration,
    interval: Duration,
}

impl MaintenanceTask {
    pub fn new(
        log_dir: Arc<LogDir>,
        retention_bytes: u64,
        roll_max_age: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            log_dir,
            retention_bytes,
            roll_max_age,
            interval,
        }
    }

    /// Run until cancelled (select against the daemon's shutdown future).
    pub async fn run(self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            retention_bytes = self.retention_bytes,
            "maintenance task started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup isn't
        // burdened with a full sweep
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// One maintenance pass over every partition.
    pub async fn sweep(&self) {
        match self.log_dir.roll_aged_segments(self.roll_max_age).await {
            Ok(rolled) if rolled > 0 => {
                debug!(rolled, "age-based segment rolls");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "age-based roll failed"),
        }

        for topic in self.log_dir.list_topics().await {
            for partition in self.log_dir.list_partitions(&topic).await {
                match self
                    .log_dir
                    .cleanup_old_segments(&topic, partition, self.retention_bytes)
                    .await
                {
                    Ok(deleted) if deleted > 0 => {
                        info!(topic, partition, deleted, "retention cleanup");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(topic, partition, error = %e, "retention cleanup failed");
                    }
                }
            }
        }
    }
}
