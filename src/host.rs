#[cfg(test)]
pub mod fake;

use std::{
    fmt,
    path::Path,
    process::{ExitStatus, Stdio},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, instrument};

use crate::{
    netlink::{error::NetlinkError, links::NetInterface, Netlink},
    traits::Host,
    utils,
};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("`{command}` returned an invalid key")]
    InvalidKey { command: &'static str },
    #[error(transparent)]
    Netlink(#[from] NetlinkError),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub private: String,
    pub public: String,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("private", &"<redacted>")
            .field("public", &self.public)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Firewall {
    Ufw,
    Iptables,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Enable,
    Restart,
    Stop,
    Disable,
}

impl UnitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitAction::Enable => "enable",
            UnitAction::Restart => "restart",
            UnitAction::Stop => "stop",
            UnitAction::Disable => "disable",
        }
    }
}

/// Runs the real `wg`, `systemctl`, `sysctl`, `ufw`/`iptables` and `ip` binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

async fn run(program: &str, args: &[&str], stdin: Option<&str>) -> Result<String, HostError> {
    let command = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    debug!(%command, "running");

    let spawn_err = |source| HostError::Spawn {
        command: command.clone(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await.map_err(spawn_err)?;
    }

    let output = child.wait_with_output().await.map_err(spawn_err)?;
    if !output.status.success() {
        return Err(HostError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl Host for SystemHost {
    #[instrument(skip(self))]
    async fn generate_keypair(&self) -> Result<Keypair, HostError> {
        let private = run("wg", &["genkey"], None).await?.trim().to_owned();
        if !utils::valid_key(&private) {
            return Err(HostError::InvalidKey {
                command: "wg genkey",
            });
        }

        let public = run("wg", &["pubkey"], Some(&private))
            .await?
            .trim()
            .to_owned();
        if !utils::valid_key(&public) {
            return Err(HostError::InvalidKey {
                command: "wg pubkey",
            });
        }

        Ok(Keypair { private, public })
    }

    async fn show(&self, iface: &str) -> Result<String, HostError> {
        run("wg", &["show", iface], None).await
    }

    async fn interfaces(&self) -> Result<Vec<NetInterface>, HostError> {
        Ok(Netlink::new()?.interfaces()?)
    }

    #[instrument(skip(self))]
    async fn allow_port(&self, firewall: Firewall, port: u16) -> Result<(), HostError> {
        match firewall {
            Firewall::Ufw => {
                run("ufw", &["allow", &format!("{port}/udp")], None).await?;
            }
            Firewall::Iptables => {
                let port = port.to_string();
                run(
                    "iptables",
                    &["-A", "INPUT", "-p", "udp", "--dport", &port, "-j", "ACCEPT"],
                    None,
                )
                .await?;
            }
            Firewall::Off => debug!("firewall management disabled"),
        }
        Ok(())
    }

    async fn reload_sysctl(&self, path: &Path) -> Result<(), HostError> {
        run("sysctl", &["-p", &path.to_string_lossy()], None).await?;
        Ok(())
    }

    async fn systemctl(&self, action: UnitAction, unit: &str) -> Result<(), HostError> {
        run("systemctl", &[action.as_str(), unit], None).await?;
        Ok(())
    }

    async fn delete_link(&self, iface: &str) -> Result<(), HostError> {
        run("ip", &["link", "delete", "dev", iface], None).await?;
        Ok(())
    }
}
