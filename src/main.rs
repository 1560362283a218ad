mod host;
mod netlink;
mod service;
mod state;
mod telegram;
mod traits;
mod ui;
mod utils;
mod wireguard;
pub mod workers;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use host::SystemHost;
use service::Wgcfg;
use telegram::{DeliveryError, TelegramDelivery};
use tracing::{info, warn};
use workers::stats::Stats;

#[derive(Debug, Parser)]
struct Config {
    /// Start the server on launch unless it is already running
    #[clap(long)]
    bootstrap: bool,
    /// Seconds between traffic collections, 0 disables the collector
    #[clap(long, env = "STATS_INTERVAL", default_value_t = 60, value_parser)]
    stats_interval: u64,
    #[clap(flatten)]
    service: service::Config,

    #[clap(flatten)]
    api: ui::web::Config,
    #[clap(flatten)]
    bot: ui::telegram::Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    pretty_env_logger::init();

    let config = Config::parse();

    let mut state = state::load(&config.service.state).await?;

    let token = config
        .bot
        .token
        .clone()
        .or_else(|| state.bot_token.clone())
        .ok_or(DeliveryError::MissingToken)?;
    let delivery = Arc::new(TelegramDelivery::new(&token)?);
    if state.bot_token.as_deref() != Some(token.as_str()) {
        state.bot_token = Some(token);
        state::save(&config.service.state, &state).await?;
    }

    let bootstrapped = state.is_bootstrapped();
    let service = Wgcfg::new(
        config.service,
        state,
        Arc::new(SystemHost),
        delivery.clone(),
    );

    service.init().await?;

    if config.bootstrap {
        if bootstrapped {
            let server = service.server_info().await?;
            info!(addr = %server.addr, "server already started, skipping bootstrap");
        } else {
            let server = service.bootstrap().await?;
            info!(addr = %server.addr, pub_key = %server.pub_key, "bootstrap finished");
        }
    }

    if config.stats_interval > 0 {
        let worker = Stats::new(service.clone(), Duration::from_secs(config.stats_interval));
        tokio::spawn(worker.run());
    }

    for f in ui::run(config.bot, config.api, service, &delivery) {
        f.await??;

        warn!("frontend stopped")
    }

    Ok(())
}
