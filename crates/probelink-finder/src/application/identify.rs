//! The `identify` use case: ask the device at a known address who it is.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use probelink_core::{DiscoveryPacket, Identifier, MacAddr};
use tracing::debug;

use crate::application::{DiscoveryError, QueryTransport};
use crate::FinderConfig;

/// Sends a wildcard query to `ip` and decodes the reply into an identifier.
///
/// # Errors
///
/// [`DiscoveryError::ProbeNotFound`] when nothing usable answers within
/// `timeout`, and [`DiscoveryError::Identifier`] when a reply arrives but its
/// MAC belongs to no known probe family.
pub async fn identify<T: QueryTransport>(
    transport: &T,
    config: &FinderConfig,
    ip: Ipv4Addr,
    timeout: Duration,
) -> Result<Identifier, DiscoveryError> {
    let dest = SocketAddrV4::new(ip, config.discovery_port);
    let query = DiscoveryPacket::query_ip(MacAddr::WILDCARD);
    let reply = transport
        .unicast_query(query, dest, timeout)
        .await
        .ok_or(DiscoveryError::ProbeNotFound(ip))?;
    if reply.packet.mac.is_wildcard() {
        debug!(%ip, "reply carried the wildcard MAC; treating as no answer");
        return Err(DiscoveryError::ProbeNotFound(ip));
    }
    Ok(Identifier::from_mac(reply.packet.mac)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{MockQueryTransport, QueryReply};
    use probelink_core::ProbeType;
    use std::net::SocketAddr;

    fn reply(mac: MacAddr, ip: Ipv4Addr) -> QueryReply {
        QueryReply {
            packet: DiscoveryPacket::query_ip_reply(mac, ip),
            from: SocketAddr::V4(SocketAddrV4::new(ip, 59)),
        }
    }

    #[tokio::test]
    async fn test_identify_decodes_the_reporting_mac() {
        // Arrange
        let ip = Ipv4Addr::new(192, 168, 7, 12);
        let mac = Identifier::with_index(ProbeType::DaNet, 35).mac_address().unwrap();
        let mut transport = MockQueryTransport::new();
        transport
            .expect_unicast_query()
            .returning(move |_, _, _| Some(reply(mac, ip)));

        // Act
        let id = identify(&transport, &FinderConfig::default(), ip, Duration::from_millis(100))
            .await
            .unwrap();

        // Assert
        assert_eq!(id, Identifier::with_index(ProbeType::DaNet, 35));
    }

    #[tokio::test]
    async fn test_identify_reports_silence() {
        // Arrange
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let mut transport = MockQueryTransport::new();
        transport.expect_unicast_query().returning(|_, _, _| None);

        // Act
        let err = identify(&transport, &FinderConfig::default(), ip, Duration::from_millis(100))
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, DiscoveryError::ProbeNotFound(addr) if addr == ip));
    }

    #[tokio::test]
    async fn test_identify_rejects_unknown_macs() {
        // Arrange: something answered, but its MAC is outside every window.
        let ip = Ipv4Addr::new(10, 0, 0, 3);
        let mac = MacAddr::new([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        let mut transport = MockQueryTransport::new();
        transport
            .expect_unicast_query()
            .returning(move |_, _, _| Some(reply(mac, ip)));

        // Act
        let err = identify(&transport, &FinderConfig::default(), ip, Duration::from_millis(100))
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, DiscoveryError::Identifier(_)));
    }
}
