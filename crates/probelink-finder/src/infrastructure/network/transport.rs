//! UDP query/reply transport.
//!
//! Implements [`QueryTransport`] with real sockets. Two exchange shapes:
//!
//! - **Unicast** – one socket, send to a known address, wait for the first
//!   decodable reply, resend on a fixed retry schedule.
//! - **Broadcast** – one socket per eligible interface (plus the limited
//!   broadcast `255.255.255.255`), all replies funnelled into one channel
//!   until the deadline.
//!
//! Discovery runs on a best-effort wire, so transient socket errors are
//! logged and swallowed; to the caller they look like silence.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use probelink_core::DiscoveryPacket;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::application::{QueryReply, QueryTransport};
use crate::infrastructure::network::interfaces::local_interfaces;
use crate::FinderConfig;

/// Receive buffer; generously larger than the fixed packet size to tolerate
/// padded datagrams.
const RECV_BUF: usize = 64;

/// The production [`QueryTransport`].
pub struct UdpTransport {
    config: FinderConfig,
}

impl UdpTransport {
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Splits an exchange budget across the retry schedule.
    fn per_try(&self, budget: Duration) -> Duration {
        (budget / self.config.retries.max(1)).max(Duration::from_millis(1))
    }
}

#[async_trait]
impl QueryTransport for UdpTransport {
    async fn unicast_query(
        &self,
        packet: DiscoveryPacket,
        dest: SocketAddrV4,
        budget: Duration,
    ) -> Option<QueryReply> {
        let socket = match bind_udp(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0), false) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to open query socket: {e}");
                return None;
            }
        };
        let bytes = packet.encode();
        let per_try = self.per_try(budget);

        for attempt in 0..self.config.retries.max(1) {
            if let Err(e) = socket.send_to(&bytes, SocketAddr::V4(dest)).await {
                debug!(%dest, attempt, "query send failed: {e}");
            }
            let deadline = Instant::now() + per_try;
            if let Some(reply) = recv_until(&socket, deadline).await {
                return Some(reply);
            }
            trace!(%dest, attempt, "no reply within the attempt window");
        }
        None
    }

    async fn broadcast_query(
        &self,
        packet: DiscoveryPacket,
        budget: Duration,
        replies: mpsc::Sender<QueryReply>,
    ) {
        let port = self.config.discovery_port;
        let mut endpoints: Vec<(SocketAddrV4, SocketAddrV4)> = local_interfaces()
            .into_iter()
            .map(|iface| {
                (SocketAddrV4::new(iface.addr, 0), SocketAddrV4::new(iface.broadcast, port))
            })
            .collect();
        // The limited broadcast reaches subnets the enumeration missed.
        endpoints.push((
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, port),
        ));

        let deadline = Instant::now() + budget;
        let per_try = self.per_try(budget);
        let retries = self.config.retries.max(1);

        let mut tasks = JoinSet::new();
        for (bind, dest) in endpoints {
            let socket = match bind_udp(bind, true) {
                Ok(s) => s,
                Err(e) => {
                    debug!(%bind, "failed to open broadcast socket: {e}");
                    continue;
                }
            };
            let tx = replies.clone();
            let bytes = packet.encode();
            tasks.spawn(async move {
                for _ in 0..retries {
                    if let Err(e) = socket.send_to(&bytes, SocketAddr::V4(dest)).await {
                        debug!(%dest, "broadcast send failed: {e}");
                    }
                    let try_deadline = deadline.min(Instant::now() + per_try);
                    forward_until(&socket, try_deadline, &tx).await;
                    if Instant::now() >= deadline {
                        break;
                    }
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

/// Waits for the first decodable reply on `socket`, up to `deadline`.
async fn recv_until(socket: &UdpSocket, deadline: Instant) -> Option<QueryReply> {
    let mut buf = [0u8; RECV_BUF];
    loop {
        let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                debug!("recv error: {e}");
                continue;
            }
            Err(_) => return None, // deadline
        };
        match DiscoveryPacket::decode(&buf[..len]) {
            Ok(packet) => return Some(QueryReply { packet, from }),
            Err(e) => trace!(%from, "undecodable datagram: {e}"),
        }
    }
}

/// Forwards every decodable reply on `socket` into `tx`, up to `deadline`.
async fn forward_until(socket: &UdpSocket, deadline: Instant, tx: &mpsc::Sender<QueryReply>) {
    let mut buf = [0u8; RECV_BUF];
    loop {
        let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                debug!("recv error: {e}");
                continue;
            }
            Err(_) => return,
        };
        match DiscoveryPacket::decode(&buf[..len]) {
            Ok(packet) => {
                if tx.send(QueryReply { packet, from }).await.is_err() {
                    return; // receiver gone
                }
            }
            Err(e) => trace!(%from, "undecodable datagram: {e}"),
        }
    }
}

/// Opens a nonblocking UDP socket registered with the Tokio reactor.
fn bind_udp(bind: SocketAddrV4, broadcast: bool) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    // A broadcast sweep can fan in a burst of replies; don't drop them.
    socket.set_recv_buffer_size(64 * 1024).ok();
    socket.set_send_buffer_size(64 * 1024).ok();
    socket.bind(&SockAddr::from(SocketAddr::V4(bind)))?;
    UdpSocket::from_std(socket.into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use probelink_core::{Identifier, MacAddr, ProbeType};
    use std::sync::Arc;

    /// Binds a fake probe on loopback that answers one query with `reply`.
    async fn fake_probe(reply: DiscoveryPacket) -> SocketAddrV4 {
        let socket = Arc::new(
            UdpSocket::bind("127.0.0.1:0").await.expect("fake probe bind"),
        );
        let addr = match socket.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUF];
            let (_, from) = socket.recv_from(&mut buf).await.expect("fake probe recv");
            socket.send_to(&reply.encode(), from).await.expect("fake probe send");
        });
        addr
    }

    #[tokio::test]
    async fn test_unicast_query_receives_a_reply() {
        // Arrange
        let mac = Identifier::with_index(ProbeType::DaNet, 35).mac_address().unwrap();
        let reply = DiscoveryPacket::query_ip_reply(mac, Ipv4Addr::new(10, 0, 0, 9));
        let dest = fake_probe(reply).await;
        let transport = UdpTransport::new(FinderConfig::default());

        // Act
        let got = transport
            .unicast_query(
                DiscoveryPacket::query_ip(MacAddr::WILDCARD),
                dest,
                Duration::from_secs(1),
            )
            .await;

        // Assert
        let got = got.expect("must receive the reply");
        assert_eq!(got.packet, reply);
    }

    #[tokio::test]
    async fn test_unicast_query_times_out_in_silence() {
        // Arrange: a bound socket that never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = match silent.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        let transport = UdpTransport::new(FinderConfig::default());

        // Act
        let started = std::time::Instant::now();
        let got = transport
            .unicast_query(
                DiscoveryPacket::query_ip(MacAddr::WILDCARD),
                dest,
                Duration::from_millis(90),
            )
            .await;

        // Assert: None, and the full budget was spent (3 tries of 30 ms).
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_unicast_query_skips_undecodable_datagrams() {
        // Arrange: a peer that sends junk first, then a valid reply.
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let dest = match socket.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        let mac = Identifier::with_index(ProbeType::Dash, 7).mac_address().unwrap();
        let reply = DiscoveryPacket::query_ip_reply(mac, Ipv4Addr::new(10, 0, 0, 44));
        tokio::spawn({
            let socket = Arc::clone(&socket);
            async move {
                let mut buf = [0u8; RECV_BUF];
                let (_, from) = socket.recv_from(&mut buf).await.unwrap();
                socket.send_to(b"not a packet", from).await.unwrap();
                socket.send_to(&reply.encode(), from).await.unwrap();
            }
        });
        let transport = UdpTransport::new(FinderConfig::default());

        // Act
        let got = transport
            .unicast_query(
                DiscoveryPacket::query_ip(MacAddr::WILDCARD),
                dest,
                Duration::from_secs(1),
            )
            .await;

        // Assert
        assert_eq!(got.expect("valid reply must get through").packet, reply);
    }

    #[tokio::test]
    async fn test_broadcast_query_closes_the_channel_at_the_deadline() {
        // Arrange: no probes anywhere; the exchange must still terminate.
        let transport = UdpTransport::new(FinderConfig {
            discovery_port: 39_059, // away from anything real
            ..FinderConfig::default()
        });
        let (tx, mut rx) = mpsc::channel(16);

        // Act
        transport
            .broadcast_query(
                DiscoveryPacket::query_ip(MacAddr::WILDCARD),
                Duration::from_millis(120),
                tx,
            )
            .await;

        // Assert: all senders dropped, so the channel reports closed.
        assert!(rx.recv().await.is_none());
    }
}
