pub mod clients;
pub mod server;
pub mod traffic;
pub mod wgcfg;

use std::{net::IpAddr, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use clap::Parser;
pub use wgcfg::*;

use crate::{
    host::Firewall,
    state::{self, ServerState},
    traits::{ConfigDelivery, Host},
    wireguard::ConfigFile,
};

struct Shared {
    state: ServerState,
}

#[derive(Debug, Clone, Parser)]
pub struct Config {
    /// JSON file holding server keys and registered clients
    #[clap(long, env = "STATE_FILE", default_value = "wireguard.json", value_parser)]
    pub state: PathBuf,
    #[clap(long, env = "WG_DIR", default_value = "/etc/wireguard", value_parser)]
    pub wg_dir: PathBuf,
    #[clap(long, env = "WG_INTERFACE", default_value = "wg0", value_parser)]
    pub interface: String,
    #[clap(long, env = "SYSCTL_CONF", default_value = "/etc/sysctl.conf", value_parser)]
    pub sysctl_conf: PathBuf,
    /// DNS server written into client configs
    #[clap(long, env = "CLIENT_DNS", default_value = "8.8.8.8", value_parser)]
    pub dns: IpAddr,
    #[clap(long, env = "FIREWALL", default_value = "ufw", value_enum)]
    pub firewall: Firewall,
}

/// Single entry point to the registry, the config file and the host.
///
/// Every mutation happens under one lock, so concurrent requests are applied
/// one after another.
#[derive(Clone)]
pub struct Wgcfg {
    config: Arc<Config>,
    shared: Arc<Mutex<Shared>>,
    host: Arc<dyn Host>,
    delivery: Arc<dyn ConfigDelivery>,
}

impl Wgcfg {
    pub fn new(
        config: Config,
        state: ServerState,
        host: Arc<dyn Host>,
        delivery: Arc<dyn ConfigDelivery>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(Shared { state })),
            host,
            delivery,
        }
    }

    fn config_file(&self) -> ConfigFile {
        ConfigFile::new(
            self.config
                .wg_dir
                .join(format!("{}.conf", self.config.interface)),
        )
    }

    fn unit(&self) -> String {
        format!("wg-quick@{}.service", self.config.interface)
    }

    async fn persist(&self, state: &ServerState) -> Result<(), ServiceError> {
        Ok(state::save(&self.config.state, state).await?)
    }

    /// Snapshot of the current registry state.
    pub async fn state(&self) -> ServerState {
        self.shared.lock().await.state.clone()
    }
}
