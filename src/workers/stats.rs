use std::time::Duration;

use tracing::{debug, warn};

use crate::service::Wgcfg;

/// Periodically copies `wg show` transfer counters into the registry.
pub struct Stats {
    service: Wgcfg,
    interval: Duration,
}

impl Stats {
    pub fn new(service: Wgcfg, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn tick(&self) {
        match self.service.refresh_traffic().await {
            Ok(updated) => debug!(updated, "traffic stats collected"),
            Err(e) => warn!("failed to collect traffic stats: {e}"),
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}
