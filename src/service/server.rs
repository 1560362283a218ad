use std::{net::SocketAddr, ops::Range, path::Path};

use rand::Rng;
use tokio::net::UdpSocket;
use tracing::{debug, info, instrument, warn};

use super::{ServerInfo, ServiceError, Wgcfg};
use crate::{
    host::UnitAction,
    netlink::links::select_uplink,
    state::ServerState,
    utils,
    wireguard::{Section, WgConfig},
};

const PORT_RANGE: Range<u16> = 1024..10000;
const PORT_ATTEMPTS: usize = 16;
const FORWARDING: &str = "net.ipv4.ip_forward=1";

async fn pick_port() -> Result<u16, ServiceError> {
    for _ in 0..PORT_ATTEMPTS {
        let port = rand::thread_rng().gen_range(PORT_RANGE);
        match UdpSocket::bind(("0.0.0.0", port)).await {
            Ok(_) => return Ok(port),
            Err(e) => debug!(port, "port unavailable: {e}"),
        }
    }
    Err(ServiceError::NoFreePort)
}

async fn read_optional(path: &Path) -> std::io::Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

/// Appends the forwarding directive unless it is already there.
async fn enable_forwarding(path: &Path) -> std::io::Result<bool> {
    let mut contents = read_optional(path).await?;
    if contents.lines().any(|l| l.trim() == FORWARDING) {
        return Ok(false);
    }
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(FORWARDING);
    contents.push('\n');
    utils::write_atomic(path, contents.as_bytes(), 0o644).await?;
    Ok(true)
}

async fn disable_forwarding(path: &Path) -> std::io::Result<bool> {
    let contents = read_optional(path).await?;
    let kept: Vec<&str> = contents.lines().filter(|l| l.trim() != FORWARDING).collect();
    if kept.len() == contents.lines().count() {
        return Ok(false);
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    utils::write_atomic(path, out.as_bytes(), 0o644).await?;
    Ok(true)
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Wgcfg {
    /// Stands the tunnel up: port, uplink, keys, config file, forwarding,
    /// firewall and the systemd unit.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<ServerInfo, ServiceError> {
        let mut shared = self.shared.lock().await;
        let registered = shared.state.clients.len();
        if registered > 0 {
            return Err(ServiceError::PeersRegistered(registered));
        }

        let port = pick_port().await?;
        let interfaces = self.host.interfaces().await?;
        let (uplink, ip) = select_uplink(&interfaces).ok_or(ServiceError::NoInterface)?;
        let uplink = uplink.to_owned();
        let endpoint = SocketAddr::from((ip, port));
        info!(%endpoint, %uplink, "selected endpoint");

        let keys = self.host.generate_keypair().await?;
        utils::write_atomic(
            &self.config.wg_dir.join("privatekey"),
            keys.private.as_bytes(),
            0o600,
        )
        .await?;
        utils::write_atomic(
            &self.config.wg_dir.join("publickey"),
            keys.public.as_bytes(),
            0o600,
        )
        .await?;

        let mut config = WgConfig::default();
        config.set_interface(Section::interface(&keys.private, port, &uplink));
        self.config_file().save(&config).await?;

        let sysctl = &self.config.sysctl_conf;
        if enable_forwarding(sysctl).await? {
            debug!(path = %sysctl.display(), "forwarding directive added");
        }
        self.host.reload_sysctl(sysctl).await?;
        self.host.allow_port(self.config.firewall, port).await?;

        let state = &mut shared.state;
        state.private_key = Some(keys.private);
        state.public_key = Some(keys.public.clone());
        state.listen_port = Some(port);
        state.endpoint = Some(endpoint);
        state.interface_name = Some(uplink.clone());
        self.persist(state).await?;

        let unit = self.unit();
        self.host.systemctl(UnitAction::Enable, &unit).await?;
        // Restart also starts a stopped unit and reloads a running one.
        self.host.systemctl(UnitAction::Restart, &unit).await?;

        info!(%endpoint, "server started");
        Ok(ServerInfo {
            addr: endpoint,
            pub_key: keys.public,
            uplink,
        })
    }

    /// Removes everything `bootstrap` put on the host and forgets all clients.
    #[instrument(skip(self))]
    pub async fn teardown(&self) -> Result<(), ServiceError> {
        let mut shared = self.shared.lock().await;
        let unit = self.unit();

        for action in [UnitAction::Stop, UnitAction::Disable] {
            if let Err(e) = self.host.systemctl(action, &unit).await {
                warn!(action = action.as_str(), "systemctl failed: {e}");
            }
        }
        if let Err(e) = self.host.delete_link(&self.config.interface).await {
            debug!("link removal failed: {e}");
        }

        remove_if_exists(self.config_file().path()).await?;
        remove_if_exists(&self.config.wg_dir.join("privatekey")).await?;
        remove_if_exists(&self.config.wg_dir.join("publickey")).await?;

        let sysctl = &self.config.sysctl_conf;
        if disable_forwarding(sysctl).await? {
            if let Err(e) = self.host.reload_sysctl(sysctl).await {
                warn!("sysctl reload failed: {e}");
            }
        }

        let dropped = shared.state.clients.len();
        shared.state = ServerState {
            bot_token: shared.state.bot_token.take(),
            ..Default::default()
        };
        self.persist(&shared.state).await?;

        info!(dropped, "server dropped");
        Ok(())
    }
}
