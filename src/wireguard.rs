use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;
use tracing::debug;

use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("wireguard config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: &'static str },
}

/// One `[Name]` block with its `Key = Value` entries in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.entries.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_interface(&self) -> bool {
        self.name.eq_ignore_ascii_case("Interface")
    }

    pub fn is_peer(&self) -> bool {
        self.name.eq_ignore_ascii_case("Peer")
    }

    pub fn peer(public_key: &str, allowed_ips: &str) -> Self {
        Self::new("Peer")
            .with("PublicKey", public_key)
            .with("AllowedIPs", allowed_ips)
    }

    pub fn interface(private_key: &str, listen_port: u16, uplink: &str) -> Self {
        Self::new("Interface")
            .with("PrivateKey", private_key)
            .with("Address", utils::SERVER_ADDRESS)
            .with("ListenPort", listen_port)
            .with(
                "PostUp",
                format!(
                    "iptables -A FORWARD -i %i -j ACCEPT; \
                     iptables -t nat -A POSTROUTING -o {uplink} -j MASQUERADE"
                ),
            )
            .with(
                "PostDown",
                format!(
                    "iptables -D FORWARD -i %i -j ACCEPT; \
                     iptables -t nat -D POSTROUTING -o {uplink} -j MASQUERADE"
                ),
            )
    }

    fn is_peer_with_key(&self, public_key: &str) -> bool {
        self.is_peer() && self.get("PublicKey") == Some(public_key)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.name)?;
        for (key, value) in &self.entries {
            writeln!(f, "{key} = {value}")?;
        }
        Ok(())
    }
}

/// Parsed interface config. Comments are not preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WgConfig {
    pub sections: Vec<Section>,
}

impl FromStr for WgConfig {
    type Err = ConfigFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sections: Vec<Section> = Vec::new();

        for (n, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(Section::new(name.trim()));
                continue;
            }

            let (key, value) = line.split_once('=').ok_or(ConfigFileError::Parse {
                line: n + 1,
                reason: "expected `Key = Value`",
            })?;
            let section = sections.last_mut().ok_or(ConfigFileError::Parse {
                line: n + 1,
                reason: "entry outside of a section",
            })?;
            section
                .entries
                .push((key.trim().to_owned(), value.trim().to_owned()));
        }

        Ok(Self { sections })
    }
}

impl fmt::Display for WgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{section}")?;
        }
        Ok(())
    }
}

impl WgConfig {
    pub fn interface(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_interface())
    }

    /// Replaces the interface section, keeping it first in the file.
    pub fn set_interface(&mut self, interface: Section) {
        self.sections.retain(|s| !s.is_interface());
        self.sections.insert(0, interface);
    }

    pub fn peers(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.is_peer())
    }

    pub fn peer_count(&self, public_key: &str) -> usize {
        self.sections
            .iter()
            .filter(|s| s.is_peer_with_key(public_key))
            .count()
    }

    pub fn has_peer(&self, public_key: &str) -> bool {
        self.peer_count(public_key) > 0
    }

    /// Appends `peer` unless a peer with the same public key is present.
    pub fn add_peer(&mut self, peer: Section) -> bool {
        match peer.get("PublicKey") {
            Some(key) if self.has_peer(key) => false,
            _ => {
                self.sections.push(peer);
                true
            }
        }
    }

    /// Removes every peer section with `public_key`.
    pub fn remove_peer(&mut self, public_key: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| !s.is_peer_with_key(public_key));
        before != self.sections.len()
    }

    /// Keeps only peers accepted by `keep`; returns how many were dropped.
    pub fn retain_peers(&mut self, mut keep: impl FnMut(&Section) -> bool) -> usize {
        let before = self.sections.len();
        self.sections.retain(|s| !s.is_peer() || keep(s));
        before - self.sections.len()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<WgConfig, ConfigFileError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents.parse(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "config file absent");
                Ok(WgConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, config: &WgConfig) -> Result<(), ConfigFileError> {
        utils::write_atomic(&self.path, config.to_string().as_bytes(), 0o600).await?;
        debug!(
            path = %self.path.display(),
            peers = config.peers().count(),
            "config file written"
        );
        Ok(())
    }
}
