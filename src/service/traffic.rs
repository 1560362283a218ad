use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::{ServiceError, Wgcfg};
use crate::state::PeerTraffic;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;

#[derive(Debug, Error, PartialEq)]
pub enum TrafficParseError {
    #[error("invalid traffic format: {0:?}")]
    Format(String),
    #[error("invalid traffic value: {0:?}")]
    Value(String),
    #[error("unknown traffic unit: {0:?}")]
    Unit(String),
}

/// Parses an amount such as `3.48 MiB` into bytes, truncating fractions.
pub fn parse_amount(s: &str) -> Result<u64, TrafficParseError> {
    let mut parts = s.split_whitespace();
    let (Some(value), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TrafficParseError::Format(s.to_owned()));
    };

    let value: f64 = value
        .parse()
        .map_err(|_| TrafficParseError::Value(value.to_owned()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(TrafficParseError::Value(value.to_string()));
    }

    let factor = match unit {
        "B" => 1.0,
        "KiB" => KIB,
        "MiB" => MIB,
        "GiB" => GIB,
        "TiB" => TIB,
        other => return Err(TrafficParseError::Unit(other.to_owned())),
    };

    Ok((value * factor) as u64)
}

fn parse_transfer(line: &str) -> Result<PeerTraffic, TrafficParseError> {
    let (rx, tx) = line
        .split_once(',')
        .ok_or_else(|| TrafficParseError::Format(line.to_owned()))?;
    let rx = rx.trim();
    let tx = tx.trim();
    let rx = rx.strip_suffix("received").unwrap_or(rx);
    let tx = tx.strip_suffix("sent").unwrap_or(tx);

    Ok(PeerTraffic {
        traffic_rx: parse_amount(rx)?,
        traffic_tx: parse_amount(tx)?,
    })
}

/// Per-peer transfer counters from `wg show` output, keyed by public key.
pub fn parse_wg_show(output: &str) -> HashMap<String, PeerTraffic> {
    let mut res = HashMap::new();
    let mut current: Option<&str> = None;

    for line in output.lines().map(str::trim) {
        if let Some(peer) = line.strip_prefix("peer:") {
            current = Some(peer.trim());
        } else if let Some(transfer) = line.strip_prefix("transfer:") {
            let Some(peer) = current else {
                continue;
            };
            match parse_transfer(transfer) {
                Ok(traffic) => {
                    res.insert(peer.to_owned(), traffic);
                }
                Err(e) => warn!(peer, "skipping transfer line: {e}"),
            }
        }
    }

    res
}

impl Wgcfg {
    #[instrument(skip(self))]
    pub async fn collect_traffic(&self) -> Result<HashMap<String, PeerTraffic>, ServiceError> {
        let output = self.host.show(&self.config.interface).await?;
        Ok(parse_wg_show(&output))
    }

    /// Stores the latest counters on the matching clients.
    #[instrument(skip(self))]
    pub async fn refresh_traffic(&self) -> Result<usize, ServiceError> {
        let traffic = self.collect_traffic().await?;

        let mut shared = self.shared.lock().await;
        let mut updated = 0;
        for client in shared.state.clients.values_mut() {
            if let Some(t) = traffic.get(&client.public_key) {
                if client.traffic != *t {
                    client.traffic = *t;
                    updated += 1;
                }
            }
        }

        if updated > 0 {
            self.persist(&shared.state).await?;
        }
        debug!(peers = traffic.len(), updated, "traffic refreshed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::service::testing;

    #[test_case("512 B", 512 ; "bytes")]
    #[test_case("1.5 KiB", 1536 ; "kibibytes")]
    #[test_case("3.48 MiB", 3649044 ; "mebibytes")]
    #[test_case("33.46 MiB", 35085352 ; "mebibytes truncated")]
    #[test_case("2.00 GiB", 2147483648 ; "gibibytes")]
    #[test_case("1.00 TiB", 1099511627776 ; "tebibytes")]
    fn amounts(input: &str, expected: u64) {
        assert_eq!(parse_amount(input), Ok(expected));
    }

    #[test_case("12" ; "missing unit")]
    #[test_case("1.0 MiB extra" ; "trailing word")]
    #[test_case("abc MiB" ; "not a number")]
    #[test_case("1.0 MB" ; "decimal unit")]
    #[test_case("-1 KiB" ; "negative")]
    fn bad_amounts(input: &str) {
        assert!(parse_amount(input).is_err());
    }

    #[test]
    fn single_peer_transfer() {
        let out = parse_wg_show("peer: ABC\n  transfer: 3.48 MiB received, 33.46 MiB sent\n");
        assert_eq!(out.len(), 1);
        assert_eq!(
            out["ABC"],
            PeerTraffic {
                traffic_rx: 3649044,
                traffic_tx: 35085352
            }
        );
    }

    const WG_SHOW: &str = "\
interface: wg0
  public key: c2VydmVy
  private key: (hidden)
  listening port: 5000

peer: AAAA=
  endpoint: 198.51.100.4:51820
  allowed ips: 10.0.0.2/32
  latest handshake: 1 minute, 2 seconds ago
  transfer: 1.21 GiB received, 512 B sent

peer: BBBB=
  allowed ips: 10.0.0.3/32
  transfer: garbage

peer: CCCC=
  allowed ips: 10.0.0.4/32
";

    #[test]
    fn full_output() {
        let out = parse_wg_show(WG_SHOW);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out["AAAA="],
            PeerTraffic {
                traffic_rx: 1299227607,
                traffic_tx: 512
            }
        );
    }

    #[test]
    fn transfer_before_any_peer_is_ignored() {
        assert!(parse_wg_show("transfer: 1 B received, 2 B sent\n").is_empty());
    }

    #[tokio::test]
    async fn refresh_stores_counters_on_clients() {
        let dir = tempfile::tempdir().unwrap();
        let (service, host, _) = testing::bootstrapped(dir.path()).await;
        let client = service.add(2, None).await.unwrap();
        service.add(3, None).await.unwrap();

        host.set_show_output(&format!(
            "peer: {}\n  transfer: 1.5 KiB received, 2.00 GiB sent\n",
            client.public_key
        ));

        assert_eq!(service.refresh_traffic().await.unwrap(), 1);
        assert_eq!(service.refresh_traffic().await.unwrap(), 0);

        let state = service.state().await;
        assert_eq!(
            state.clients[&2].traffic,
            PeerTraffic {
                traffic_rx: 1536,
                traffic_tx: 2147483648
            }
        );
        assert_eq!(state.clients[&3].traffic, PeerTraffic::default());
        assert!(host.calls().contains(&"wg show wg0".to_owned()));
    }
}
