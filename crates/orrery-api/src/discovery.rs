//! Alpaca UDP discovery.
//!
//! A client broadcasts `alpacadiscovery1` to port 32227; every Alpaca
//! server on the segment answers with `{"AlpacaPort": <port>}` from its
//! own address. Replies are collected until the deadline and deduplicated
//! by socket address.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Error;

/// Well-known Alpaca discovery port.
pub const DISCOVERY_PORT: u16 = 32227;

/// Discovery request payload (protocol version 1).
pub const DISCOVERY_MESSAGE: &[u8] = b"alpacadiscovery1";

#[derive(Debug, Deserialize)]
struct DiscoveryReply {
    #[serde(rename = "AlpacaPort")]
    alpaca_port: u16,
}

/// Parse a discovery reply datagram into the advertised HTTP port.
pub fn parse_reply(datagram: &[u8]) -> Option<u16> {
    serde_json::from_slice::<DiscoveryReply>(datagram)
        .ok()
        .map(|r| r.alpaca_port)
}

/// Broadcast on the local segment and collect responding servers.
pub async fn discover_servers(timeout: Duration) -> Result<Vec<SocketAddr>, Error> {
    let target = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, DISCOVERY_PORT));
    discover_servers_at(target, timeout).await
}

/// Send the discovery request to `target` and collect replies until `timeout`.
///
/// Returns each responder's IP paired with its advertised `AlpacaPort`.
/// A timeout with no replies is an empty result, not an error.
pub async fn discover_servers_at(
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, Error> {
    let socket = UdpSocket::bind(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))).await?;
    socket.set_broadcast(true)?;

    debug!(%target, "sending Alpaca discovery request");
    socket.send_to(DISCOVERY_MESSAGE, target).await?;

    let deadline = Instant::now() + timeout;
    let mut found = BTreeSet::new();
    let mut buf = [0u8; 1024];

    loop {
        match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => {
                let Some(datagram) = buf.get(..len) else {
                    continue;
                };
                match parse_reply(datagram) {
                    Some(port) => {
                        let server = SocketAddr::new(from.ip(), port);
                        if found.insert(server) {
                            debug!(%server, "Alpaca server responded");
                        }
                    }
                    None => trace!(%from, "ignoring malformed discovery reply"),
                }
            }
            Ok(Err(e)) => return Err(Error::Discovery(e)),
            Err(_elapsed) => break,
        }
    }

    Ok(found.into_iter().collect())
}
