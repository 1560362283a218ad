use std::fmt::Write;

use tracing::{debug, info, instrument, warn};

use super::{ServiceError, Shared, Wgcfg};
use crate::{
    state::{Client, PeerConfig, ServerState},
    utils,
    wireguard::Section,
};

const CLIENT_IDS: std::ops::RangeInclusive<u32> = 2..=254;
const CONFIG_FILE_NAME: &str = "wgconf.conf";

impl Wgcfg {
    /// Registers (or re-keys) client `id` and enables its peer block.
    #[instrument(skip(self))]
    pub async fn add(&self, id: u32, tg_id: Option<i64>) -> Result<Client, ServiceError> {
        if !CLIENT_IDS.contains(&id) {
            return Err(ServiceError::InvalidId(id));
        }

        let mut shared = self.shared.lock().await;
        let state = &mut shared.state;
        let (Some(server_key), Some(endpoint)) = (state.public_key.clone(), state.endpoint) else {
            return Err(ServiceError::NotBootstrapped);
        };

        let keys = self.host.generate_keypair().await?;

        let file = self.config_file();
        let mut config = file.load().await?;
        let previous = state.clients.get(&id);
        if let Some(old) = previous {
            if config.remove_peer(&old.public_key) {
                debug!(id, "replacing peer block of previous client");
            }
        }

        let peer_section = Section::peer(&keys.public, &utils::peer_allowed_ips(id));
        let peer_block = peer_section.to_string();
        config.add_peer(peer_section);
        file.save(&config).await?;

        let address = utils::client_address(id);
        let peer = PeerConfig {
            public_key: server_key,
            allowed_ips: "0.0.0.0/0".to_owned(),
            endpoint: endpoint.to_string(),
        };
        let client = Client {
            id,
            status: true,
            config: utils::format_client_config(
                &address,
                &keys.private,
                &self.config.dns.to_string(),
                &peer,
            ),
            address_client: address,
            private_key: keys.private,
            public_key: keys.public,
            peer,
            peer_block,
            tg_id: tg_id.or_else(|| previous.and_then(|c| c.tg_id)),
            traffic: Default::default(),
        };

        state.clients.insert(id, client.clone());
        self.persist(state).await?;
        self.restart().await?;

        info!(id, address = %client.address_client, "client added");
        Ok(client)
    }

    /// Removes the peer block of client `id`. Returns `false` for an unknown id.
    #[instrument(skip(self))]
    pub async fn stop(&self, id: u32) -> Result<bool, ServiceError> {
        let mut shared = self.shared.lock().await;
        self.stop_locked(&mut shared, id).await
    }

    async fn stop_locked(&self, shared: &mut Shared, id: u32) -> Result<bool, ServiceError> {
        let Some(client) = shared.state.clients.get_mut(&id) else {
            warn!(id, "client not found");
            return Ok(false);
        };

        let file = self.config_file();
        let mut config = file.load().await?;
        if !config.remove_peer(&client.public_key) {
            warn!(id, "peer block already absent from config file");
        }
        file.save(&config).await?;

        client.status = false;
        self.persist(&shared.state).await?;
        self.restart().await?;

        info!(id, "client stopped");
        Ok(true)
    }

    /// Puts the peer block of client `id` back. Returns `false` for an unknown id.
    #[instrument(skip(self))]
    pub async fn activate(&self, id: u32) -> Result<bool, ServiceError> {
        let mut shared = self.shared.lock().await;
        let Some(client) = shared.state.clients.get_mut(&id) else {
            warn!(id, "client not found");
            return Ok(false);
        };

        let file = self.config_file();
        let mut config = file.load().await?;
        if config.add_peer(Section::peer(
            &client.public_key,
            &utils::peer_allowed_ips(id),
        )) {
            file.save(&config).await?;
        } else {
            debug!(id, "peer block already present");
        }

        client.status = true;
        self.persist(&shared.state).await?;
        self.restart().await?;

        info!(id, "client activated");
        Ok(true)
    }

    /// Stops client `id` and forgets it. Returns `false` for an unknown id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: u32) -> Result<bool, ServiceError> {
        let mut shared = self.shared.lock().await;
        if !self.stop_locked(&mut shared, id).await? {
            return Ok(false);
        }

        shared.state.clients.remove(&id);
        self.persist(&shared.state).await?;

        info!(id, "client deleted");
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> String {
        let shared = self.shared.lock().await;
        format_clients(&shared.state)
    }

    /// Uploads the rendered config of client `id` to its telegram chat.
    #[instrument(skip(self))]
    pub async fn send_config(&self, id: u32) -> Result<(), ServiceError> {
        let (chat, config) = {
            let shared = self.shared.lock().await;
            let client = shared
                .state
                .clients
                .get(&id)
                .ok_or(ServiceError::NotFound(id))?;
            let chat = client.tg_id.ok_or(ServiceError::NoChat(id))?;
            (chat, client.config.clone())
        };

        self.delivery
            .send_document(chat, CONFIG_FILE_NAME, config)
            .await?;

        info!(id, chat, "config delivered");
        Ok(())
    }
}

fn format_clients(state: &ServerState) -> String {
    let mut res = String::new();
    for (id, client) in &state.clients {
        let _ = writeln!(
            res,
            "Client {id} status {status} address {addr}",
            status = if client.status { "active" } else { "stopped" },
            addr = client.address_client,
        );
    }
    res
}
