use std::{collections::BTreeMap, net::Ipv4Addr};

use netlink_packet_route::{
    constants::{AF_INET, IFF_LOOPBACK, IFF_UP},
    nlas::{address, link},
    AddressMessage, LinkMessage, RtnlMessage,
};

use super::{Netlink, NetlinkError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub index: u32,
    pub name: String,
    pub up: bool,
    pub loopback: bool,
    pub ipv4: Vec<Ipv4Addr>,
}

impl From<LinkMessage> for NetInterface {
    fn from(msg: LinkMessage) -> Self {
        let mut res = Self {
            index: msg.header.index,
            up: msg.header.flags & IFF_UP != 0,
            loopback: msg.header.flags & IFF_LOOPBACK != 0,
            ..Default::default()
        };
        for nla in msg.nlas {
            if let link::Nla::IfName(name) = nla {
                res.name = name;
            }
        }
        res
    }
}

fn ipv4_of(msg: &AddressMessage) -> Option<Ipv4Addr> {
    if msg.header.family != AF_INET as u8 {
        return None;
    }
    // Point-to-point links carry the peer in Address and our side in Local.
    let mut found = None;
    for nla in &msg.nlas {
        match nla {
            address::Nla::Local(bytes) => return octets(bytes),
            address::Nla::Address(bytes) => found = octets(bytes),
            _ => {}
        }
    }
    found
}

fn octets(bytes: &[u8]) -> Option<Ipv4Addr> {
    let b: [u8; 4] = bytes.try_into().ok()?;
    Some(Ipv4Addr::from(b))
}

impl Netlink {
    pub fn interfaces(&self) -> Result<Vec<NetInterface>, NetlinkError> {
        let links: Vec<RtnlMessage> =
            Self::dump(&self.route, RtnlMessage::GetLink(LinkMessage::default()))?;

        let mut by_index = BTreeMap::new();
        for msg in links {
            if let RtnlMessage::NewLink(link) = msg {
                let iface = NetInterface::from(link);
                by_index.insert(iface.index, iface);
            }
        }

        let mut request = AddressMessage::default();
        request.header.family = AF_INET as u8;
        let addresses: Vec<RtnlMessage> =
            Self::dump(&self.route, RtnlMessage::GetAddress(request))?;

        for msg in addresses {
            if let RtnlMessage::NewAddress(addr) = msg {
                let index = addr.header.index;
                if let (Some(ip), Some(iface)) = (ipv4_of(&addr), by_index.get_mut(&index)) {
                    iface.ipv4.push(ip);
                }
            }
        }

        Ok(by_index.into_values().collect())
    }
}

/// First interface that is up, not a loopback, and carries an IPv4 address.
pub fn select_uplink(interfaces: &[NetInterface]) -> Option<(&str, Ipv4Addr)> {
    interfaces
        .iter()
        .filter(|i| i.up && !i.loopback)
        .find_map(|i| i.ipv4.first().map(|ip| (i.name.as_str(), *ip)))
}
