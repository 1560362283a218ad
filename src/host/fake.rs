use std::{
    net::Ipv4Addr,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use super::{Firewall, HostError, Keypair, UnitAction};
use crate::{
    netlink::links::NetInterface,
    telegram::DeliveryError,
    traits::{ConfigDelivery, Host},
};

/// Records every command instead of touching the machine.
#[derive(Clone, Default)]
pub struct FakeHost {
    calls: Arc<Mutex<Vec<String>>>,
    show_output: Arc<Mutex<String>>,
    fail: Arc<Mutex<Option<&'static str>>>,
    interfaces: Arc<Mutex<Vec<NetInterface>>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self::default();
        host.set_interfaces(vec![
            NetInterface {
                index: 1,
                name: "lo".to_owned(),
                up: true,
                loopback: true,
                ipv4: vec![Ipv4Addr::LOCALHOST],
            },
            NetInterface {
                index: 2,
                name: "eth0".to_owned(),
                up: true,
                loopback: false,
                ipv4: vec![Ipv4Addr::new(203, 0, 113, 10)],
            },
        ]);
        host
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_show_output(&self, output: &str) {
        *self.show_output.lock().unwrap() = output.to_owned();
    }

    pub fn set_interfaces(&self, interfaces: Vec<NetInterface>) {
        *self.interfaces.lock().unwrap() = interfaces;
    }

    /// Makes every call whose recorded line starts with `prefix` fail.
    pub fn fail_on(&self, prefix: &'static str) {
        *self.fail.lock().unwrap() = Some(prefix);
    }

    fn record(&self, call: String) -> Result<(), HostError> {
        let failing = matches!(*self.fail.lock().unwrap(), Some(p) if call.starts_with(p));
        self.calls.lock().unwrap().push(call.clone());
        if failing {
            return Err(HostError::Failed {
                command: call,
                status: Default::default(),
                stderr: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn generate_keypair(&self) -> Result<Keypair, HostError> {
        self.record("wg genkey".to_owned())?;
        let private = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&private);
        Ok(Keypair {
            private: STANDARD.encode(private.to_bytes()),
            public: STANDARD.encode(public.to_bytes()),
        })
    }

    async fn show(&self, iface: &str) -> Result<String, HostError> {
        self.record(format!("wg show {iface}"))?;
        Ok(self.show_output.lock().unwrap().clone())
    }

    async fn interfaces(&self) -> Result<Vec<NetInterface>, HostError> {
        self.record("netlink dump".to_owned())?;
        Ok(self.interfaces.lock().unwrap().clone())
    }

    async fn allow_port(&self, firewall: Firewall, port: u16) -> Result<(), HostError> {
        self.record(format!("firewall {firewall:?} allow {port}/udp"))
    }

    async fn reload_sysctl(&self, path: &Path) -> Result<(), HostError> {
        self.record(format!("sysctl -p {}", path.display()))
    }

    async fn systemctl(&self, action: UnitAction, unit: &str) -> Result<(), HostError> {
        self.record(format!("systemctl {} {unit}", action.as_str()))
    }

    async fn delete_link(&self, iface: &str) -> Result<(), HostError> {
        self.record(format!("ip link delete dev {iface}"))
    }
}

#[derive(Clone, Default)]
pub struct FakeDelivery {
    pub sent: Arc<Mutex<Vec<(i64, String, String)>>>,
}

#[async_trait]
impl ConfigDelivery for FakeDelivery {
    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: String,
    ) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, file_name.to_owned(), contents));
        Ok(())
    }
}
