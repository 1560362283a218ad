use std::{collections::HashSet, net::SocketAddr};

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::Wgcfg;
use crate::{
    host::{HostError, UnitAction},
    state::StateError,
    telegram::DeliveryError,
    wireguard::{ConfigFileError, Section},
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    ConfigFile(#[from] ConfigFileError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("client {0} not found")]
    NotFound(u32),
    #[error("client id {0} is out of range, expected 2..=254")]
    InvalidId(u32),
    #[error("client {0} has no telegram chat id")]
    NoChat(u32),
    #[error("server is not started yet")]
    NotBootstrapped,
    #[error("{0} clients are registered, drop the server before starting it again")]
    PeersRegistered(usize),
    #[error("no usable network interface found")]
    NoInterface,
    #[error("no free udp port found")]
    NoFreePort,
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Host(_) => "host_command",
            ServiceError::ConfigFile(_) => "config_file",
            ServiceError::State(_) => "state_file",
            ServiceError::Delivery(_) => "delivery",
            ServiceError::Io(_) => "io",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidId(_) => "invalid_id",
            ServiceError::NoChat(_) => "no_chat",
            ServiceError::NotBootstrapped => "not_bootstrapped",
            ServiceError::PeersRegistered(_) => "peers_registered",
            ServiceError::NoInterface => "no_interface",
            ServiceError::NoFreePort => "no_free_port",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub addr: SocketAddr,
    pub pub_key: String,
    pub uplink: String,
}

impl Wgcfg {
    #[instrument(skip(self))]
    pub async fn server_info(&self) -> Result<ServerInfo, ServiceError> {
        let shared = self.shared.lock().await;
        let state = &shared.state;
        match (&state.endpoint, &state.public_key) {
            (Some(addr), Some(pub_key)) => Ok(ServerInfo {
                addr: *addr,
                pub_key: pub_key.clone(),
                uplink: state.interface_name.clone().unwrap_or_default(),
            }),
            _ => Err(ServiceError::NotBootstrapped),
        }
    }

    pub(super) async fn restart(&self) -> Result<(), ServiceError> {
        Ok(self
            .host
            .systemctl(UnitAction::Restart, &self.unit())
            .await?)
    }

    /// Brings the peer sections of the config file in line with the active
    /// clients of the registry.
    #[instrument(skip(self))]
    pub async fn init(&self) -> Result<(), ServiceError> {
        let shared = self.shared.lock().await;
        let state = &shared.state;
        if !state.is_bootstrapped() {
            info!("server not started yet, nothing to restore");
            return Ok(());
        }

        let file = self.config_file();
        let mut config = file.load().await?;
        if config.interface().is_none() {
            warn!(
                path = %file.path().display(),
                "config file has no interface section, start the server again"
            );
            return Ok(());
        }

        let active: HashSet<&str> = state
            .clients
            .values()
            .filter(|c| c.status)
            .map(|c| c.public_key.as_str())
            .collect();

        let dropped = config.retain_peers(|p| {
            p.get("PublicKey")
                .map(|k| active.contains(k))
                .unwrap_or(false)
        });
        // Duplicates of an active key collapse into a single block.
        let mut duplicates = 0;
        for key in &active {
            let count = config.peer_count(key);
            if count > 1 {
                config.remove_peer(key);
                duplicates += count;
            }
        }

        let mut restored = 0;
        for client in state.clients.values().filter(|c| c.status) {
            let peer = Section::peer(
                &client.public_key,
                &crate::utils::peer_allowed_ips(client.id),
            );
            if config.add_peer(peer) {
                restored += 1;
            }
        }

        if dropped == 0 && restored == 0 && duplicates == 0 {
            info!(active = active.len(), "config file matches registry");
            return Ok(());
        }

        warn!(dropped, restored, duplicates, "config file drifted from registry, rewriting");
        file.save(&config).await?;
        self.restart().await
    }
}
