use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::Publisher;

/// Background ticker that publishes due chapters on a fixed interval
pub struct PublishScheduler {
    publisher: Arc<Publisher>,
    interval_seconds: u64,
}

impl PublishScheduler {
    pub fn new(publisher: Arc<Publisher>, interval_seconds: u64) -> Self {
        Self {
            publisher,
            interval_seconds,
        }
    }

    /// Start the scheduler in the background
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Publish scheduler started with interval: {}s",
                self.interval_seconds
            );

            let mut ticker = interval(Duration::from_secs(self.interval_seconds));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                debug!("Scheduler tick: checking for due chapters");
                self.tick().await;
            }
        })
    }

    async fn tick(&self) {
        match self.publisher.publish_due(Utc::now()).await {
            Ok(report) if !report.published.is_empty() => {
                info!(
                    "Scheduler published {} chapter(s)",
                    report.published.len()
                );
            }
            Ok(_) => {}
            Err(e) => error!("Error publishing scheduled chapters: {}", e.log_safe()),
        }
    }
}
