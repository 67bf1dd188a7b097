//! Discovery responder: advertise a probe hosted on this machine.
//!
//! Software probes (and test rigs) have no firmware to answer discovery
//! queries, so the host answers for them. The responder binds a UDP socket
//! on the discovery port and replies to `query_ip` packets that address it,
//! exactly the way real probe firmware does:
//!
//! 1. A finder broadcasts (or unicasts) a `query_ip` whose MAC field is
//!    either the wildcard or this probe's own MAC.
//! 2. The responder sends a command-class `query_ip` reply carrying its MAC;
//!    the IP field is left unspecified so the finder uses the datagram's
//!    source address, which is correct on every interface.
//!
//! The responder runs as a blocking loop on a dedicated thread to avoid
//! tying synchronous socket I/O into the Tokio runtime. The socket carries a
//! 500 ms read timeout; on each timeout the `running` flag is checked so
//! shutdown is prompt.

use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use probelink_core::{DiscoveryPacket, Identifier, IdentifierError, MacAddr, OpCode};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Error type for responder operations.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// The advertised identifier has no derivable MAC address.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// The UDP socket could not be bound.
    #[error("failed to bind responder socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to a running responder thread.
pub struct Responder {
    local_addr: SocketAddrV4,
    identifier: Identifier,
}

impl Responder {
    /// Binds on `bind_addr` and spawns the responder thread advertising
    /// `identifier`. Port 0 picks a free port; read it back with
    /// [`Responder::local_addr`].
    pub fn start(
        identifier: Identifier,
        bind_addr: SocketAddrV4,
        running: Arc<AtomicBool>,
    ) -> Result<Responder, ResponderError> {
        let mac = identifier.mac_address()?;
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|source| ResponderError::BindFailed { addr: bind_addr, source })?;
        socket.set_read_timeout(Some(Duration::from_millis(500))).ok();
        let local_addr = match socket.local_addr() {
            Ok(SocketAddr::V4(v4)) => v4,
            _ => bind_addr,
        };

        let thread_id = identifier.clone();
        std::thread::Builder::new()
            .name("probelink-responder".to_string())
            .spawn(move || {
                responder_loop(socket, thread_id, mac, running);
            })
            .expect("failed to spawn responder thread");

        info!(%identifier, %local_addr, "responder listening");
        Ok(Responder { local_addr, identifier })
    }

    /// Address the responder is actually bound to.
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    /// The identifier being advertised.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}

/// The main receive loop executed on the responder thread.
fn responder_loop(
    socket: UdpSocket,
    identifier: Identifier,
    mac: MacAddr,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 64];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("responder recv error: {e}");
                continue;
            }
        };

        let query = match DiscoveryPacket::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(%src, "undecodable discovery datagram: {e}");
                continue;
            }
        };

        match query.op {
            OpCode::QueryIp => {
                if !query.mac.is_wildcard() && query.mac != mac {
                    trace!(%src, addressed = %query.mac, "query for a different probe");
                    continue;
                }
                debug!(%src, %identifier, "answering discovery query");
                // IP left unspecified: the finder substitutes the source
                // address, which is correct per interface.
                let reply = DiscoveryPacket::query_ip_reply(mac, std::net::Ipv4Addr::UNSPECIFIED);
                if let Err(e) = socket.send_to(&reply.encode(), src) {
                    warn!(%src, "failed to send discovery reply: {e}");
                }
            }
            other => {
                // Configuration ops make no sense for a host-advertised
                // probe; there is no NIC firmware to reconfigure.
                warn!(%src, op = ?other, "unsupported configuration op ignored");
            }
        }
    }

    info!(%identifier, "responder stopped");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use probelink_core::{PacketIdent, ProbeType};
    use std::net::Ipv4Addr;

    fn loopback_any() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    #[test]
    fn test_is_timeout_error_recognises_timed_out_and_would_block() {
        // Arrange
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let would_block = std::io::Error::new(std::io::ErrorKind::WouldBlock, "would block");
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");

        // Act / Assert
        assert!(is_timeout_error(&timed_out));
        assert!(is_timeout_error(&would_block));
        assert!(!is_timeout_error(&refused));
    }

    #[test]
    fn test_start_rejects_identifiers_without_a_mac() {
        // Arrange: simulators are host-addressed and have no MAC to claim.
        let id = Identifier::with_index(ProbeType::Simulator, 1);
        let running = Arc::new(AtomicBool::new(false));

        // Act
        let result = Responder::start(id, loopback_any(), running);

        // Assert
        assert!(matches!(result, Err(ResponderError::Identifier(_))));
    }

    #[test]
    fn test_responder_answers_wildcard_and_own_mac_but_not_others() {
        // Arrange
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let mac = id.mac_address().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let responder = Responder::start(id, loopback_any(), Arc::clone(&running)).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        let mut buf = [0u8; 64];

        // Act / Assert: wildcard query answered.
        let query = DiscoveryPacket::query_ip(MacAddr::WILDCARD);
        client.send_to(&query.encode(), responder.local_addr()).unwrap();
        let (len, _) = client.recv_from(&mut buf).expect("wildcard must be answered");
        let reply = DiscoveryPacket::decode(&buf[..len]).unwrap();
        assert_eq!(reply.ident, PacketIdent::Command);
        assert_eq!(reply.mac, mac);
        assert!(reply.ip.is_unspecified());

        // Act / Assert: addressed query answered.
        let query = DiscoveryPacket::query_ip(mac);
        client.send_to(&query.encode(), responder.local_addr()).unwrap();
        client.recv_from(&mut buf).expect("addressed query must be answered");

        // Act / Assert: query for a different probe ignored.
        let other = Identifier::with_index(ProbeType::Dash, 7).mac_address().unwrap();
        let query = DiscoveryPacket::query_ip(other);
        client.send_to(&query.encode(), responder.local_addr()).unwrap();
        assert!(client.recv_from(&mut buf).is_err(), "must stay silent");

        running.store(false, Ordering::Relaxed);
    }
}
