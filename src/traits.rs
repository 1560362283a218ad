use std::path::Path;

use async_trait::async_trait;

use crate::{
    host::{Firewall, HostError, Keypair, UnitAction},
    netlink::links::NetInterface,
    telegram::DeliveryError,
};

/// Everything the service needs from the machine it runs on.
#[async_trait]
pub trait Host: Sync + Send {
    async fn generate_keypair(&self) -> Result<Keypair, HostError>;
    async fn show(&self, iface: &str) -> Result<String, HostError>;
    async fn interfaces(&self) -> Result<Vec<NetInterface>, HostError>;
    async fn allow_port(&self, firewall: Firewall, port: u16) -> Result<(), HostError>;
    async fn reload_sysctl(&self, path: &Path) -> Result<(), HostError>;
    async fn systemctl(&self, action: UnitAction, unit: &str) -> Result<(), HostError>;
    async fn delete_link(&self, iface: &str) -> Result<(), HostError>;
}

#[async_trait]
pub trait ConfigDelivery: Sync + Send {
    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: String,
    ) -> Result<(), DeliveryError>;
}
