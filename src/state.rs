use std::{collections::BTreeMap, net::SocketAddr, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::utils;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Descriptor of the server as it appears in a client's own config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub public_key: String,
    pub allowed_ips: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTraffic {
    pub traffic_rx: u64,
    pub traffic_tx: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: u32,
    pub status: bool,
    pub address_client: String,
    pub private_key: String,
    pub public_key: String,
    pub peer: PeerConfig,
    /// Exact `[Peer]` section written into the server config.
    pub peer_block: String,
    pub config: String,
    #[serde(default)]
    pub tg_id: Option<i64>,
    #[serde(default)]
    pub traffic: PeerTraffic,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<SocketAddr>,
    #[serde(default)]
    pub listen_port: Option<u16>,
    /// Outbound NIC used for NAT.
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub clients: BTreeMap<u32, Client>,
}

impl ServerState {
    pub fn is_bootstrapped(&self) -> bool {
        self.private_key.is_some() && self.public_key.is_some() && self.endpoint.is_some()
    }
}

pub async fn load(path: &Path) -> Result<ServerState, StateError> {
    debug!(path = %path.display(), "loading state");

    match tokio::fs::read(path).await {
        Ok(contents) => {
            let state: ServerState = serde_json::from_slice(&contents)?;
            info!(
                path = %path.display(),
                clients = state.clients.len(),
                bootstrapped = state.is_bootstrapped(),
                "loaded state"
            );
            Ok(state)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "state file not found, starting with empty state");
            Ok(ServerState::default())
        }
        Err(e) => Err(StateError::Io(e)),
    }
}

pub async fn save(path: &Path, state: &ServerState) -> Result<(), StateError> {
    let contents = serde_json::to_vec_pretty(state)?;
    utils::write_atomic(path, &contents, 0o600).await?;
    debug!(path = %path.display(), clients = state.clients.len(), "saved state");
    Ok(())
}
