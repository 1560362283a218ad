use std::{io, os::unix::fs::PermissionsExt, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::state::PeerConfig;

pub const SERVER_ADDRESS: &str = "10.0.0.1/24";

/// Tunnel address handed to a client: `10.0.0.<id>/24`.
pub fn client_address(id: u32) -> String {
    format!("10.0.0.{id}/24")
}

/// Route the server keeps for a single client.
pub fn peer_allowed_ips(id: u32) -> String {
    format!("10.0.0.{id}/32")
}

/// WireGuard keys are 32 bytes, base64 encoded.
pub fn valid_key(key: &str) -> bool {
    matches!(STANDARD.decode(key), Ok(bytes) if bytes.len() == 32)
}

pub fn format_client_config(
    address: &str,
    private_key: &str,
    dns: &str,
    peer: &PeerConfig,
) -> String {
    format!(
        "[Interface]
Address = {address}
PrivateKey = {private_key}
DNS = {dns}

[Peer]
Endpoint = {endpoint}
PublicKey = {pub_key}
AllowedIPs = {allowed_ips}
",
        endpoint = peer.endpoint,
        pub_key = peer.public_key,
        allowed_ips = peer.allowed_ips,
    )
}

/// Replaces `path` by writing a sibling temp file and renaming it over.
pub async fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await?;
    }
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(".{}.tmp", name.to_string_lossy()));

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode)).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
