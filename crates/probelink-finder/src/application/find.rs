//! The `find` use case: resolve one probe identifier to a reachable address.
//!
//! Resolution runs in stages, cheapest first, and stops at the first
//! confirmation:
//!
//! 1. **Hint** – If the caller supplied `--hint`, or the identifier's
//!    selector is itself a host name, resolve it and verify the device there.
//! 2. **Broadcast** – For numeric selectors, broadcast a query addressed to
//!    the derived MAC and take the first matching reply.
//! 3. **DNS** – Derive the conventional hostname, resolve it, and verify the
//!    device at that address.
//! 4. **Speculative TCP** – For TCP-capable families that stayed silent on
//!    UDP (a probe already claimed by another session does not answer
//!    discovery), fall back to the address we believe in most and let the
//!    caller's TCP connection confirm it.
//!
//! A *wrong* answer at any stage (a different probe at the hinted address)
//! discredits that address: it is never used for the speculative fallback.
//!
//! The overall time budget is split evenly across the UDP stages that apply
//! to the identifier; each exchange further splits its share across the
//! configured retries.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use probelink_core::{DiscoveryPacket, Identifier, IdentifierError, MacAddr, Selector};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::application::{DiscoveryError, FoundProbe, Protocol, QueryTransport};
use crate::FinderConfig;

/// Outcome of verifying "is *this* probe at *that* address".
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verify {
    /// The probe answered and matches; carries the canonical identifier and
    /// the address it reported.
    Confirmed(Identifier, Ipv4Addr),
    /// A different probe answered; the address is spoken for.
    Wrong(Identifier),
    /// Nothing decodable came back.
    Silent,
}

/// Resolves identifiers to addresses through a [`QueryTransport`].
pub struct ProbeFinder<T: QueryTransport> {
    transport: Arc<T>,
    config: FinderConfig,
}

impl<T: QueryTransport + 'static> ProbeFinder<T> {
    pub fn new(transport: Arc<T>, config: FinderConfig) -> Self {
        Self { transport, config }
    }

    /// Runs the resolution pipeline for `identifier`.
    ///
    /// `hint` short-circuits discovery when the caller already knows (or
    /// suspects) the address. `timeout` bounds the whole pipeline.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Identifier`] when the identifier cannot name a
    /// device at all (index outside every window), and
    /// [`DiscoveryError::DeviceNotFound`] when every stage comes up empty.
    pub async fn find(
        &self,
        identifier: &Identifier,
        hint: Option<&str>,
        timeout: Duration,
    ) -> Result<FoundProbe, DiscoveryError> {
        // An identifier that cannot derive a MAC and has no host to try is
        // a caller error, not a quiet network.
        let target_mac = match identifier.selector {
            Selector::Index(_) => match identifier.mac_address() {
                Ok(mac) => Some(mac),
                Err(IdentifierError::UnsupportedType { .. }) => None,
                Err(e) => return Err(e.into()),
            },
            Selector::Name(_) => None,
        };

        let hint_host = hint.or_else(|| identifier.name());
        let dns_host = identifier.dns_name().ok();

        // Budget: one share per UDP stage that applies.
        let stages = [hint_host.is_some(), target_mac.is_some(), dns_host.is_some()]
            .iter()
            .filter(|s| **s)
            .count()
            .max(1) as u32;
        let stage_budget = timeout / stages;

        let mut wrong: Option<Identifier> = None;
        let mut hint_ip: Option<Ipv4Addr> = None;

        // ── Stage 1: hint ─────────────────────────────────────────────────
        if let Some(host) = hint_host {
            let started = std::time::Instant::now();
            match resolve_host(host, stage_budget).await {
                Some(ip) => {
                    hint_ip = Some(ip);
                    let remaining = stage_budget.saturating_sub(started.elapsed());
                    match self.verify_at(identifier, ip, remaining).await {
                        Verify::Confirmed(id, probe_ip) => {
                            info!(%id, %probe_ip, "confirmed at hinted address");
                            return Ok(FoundProbe { identifier: id, ip: probe_ip, protocol: Protocol::Udp });
                        }
                        Verify::Wrong(other) => {
                            warn!(%other, %ip, "a different probe answered at the hinted address");
                            wrong = Some(other);
                            hint_ip = None;
                        }
                        Verify::Silent => trace!(%ip, "no answer at hinted address"),
                    }
                }
                None => debug!(host, "hint did not resolve"),
            }
        }

        // ── Stage 2: broadcast for the derived MAC ────────────────────────
        if let Some(mac) = target_mac {
            let (tx, mut rx) = mpsc::channel(16);
            let transport = Arc::clone(&self.transport);
            let budget = stage_budget;
            let query = DiscoveryPacket::query_ip(mac);
            let broadcast = tokio::spawn(async move {
                transport.broadcast_query(query, budget, tx).await;
            });
            while let Some(reply) = rx.recv().await {
                if reply.packet.mac == mac {
                    let ip = reply.probe_ip();
                    info!(%identifier, %ip, "confirmed via broadcast");
                    // No background work may outlive the call.
                    broadcast.abort();
                    return Ok(FoundProbe {
                        identifier: identifier.clone(),
                        ip,
                        protocol: Protocol::Udp,
                    });
                }
                trace!(mac = %reply.packet.mac, "broadcast reply from a different probe");
            }
        }

        // ── Stage 3: conventional DNS name ────────────────────────────────
        let mut dns_ip: Option<Ipv4Addr> = None;
        if let Some(host) = &dns_host {
            let started = std::time::Instant::now();
            if let Some(ip) = resolve_host(host, stage_budget).await {
                dns_ip = Some(ip);
                let remaining = stage_budget.saturating_sub(started.elapsed());
                match self.verify_at(identifier, ip, remaining).await {
                    Verify::Confirmed(id, probe_ip) => {
                        info!(%id, %probe_ip, %host, "confirmed via DNS");
                        return Ok(FoundProbe { identifier: id, ip: probe_ip, protocol: Protocol::Udp });
                    }
                    Verify::Wrong(other) => {
                        warn!(%other, %ip, %host, "a different probe answered at the DNS address");
                        wrong = Some(other);
                        dns_ip = None;
                    }
                    Verify::Silent => trace!(%ip, %host, "no answer at DNS address"),
                }
            }
        }

        // ── Stage 4: speculative TCP ──────────────────────────────────────
        // A probe whose control port is already held by another session goes
        // quiet on UDP, so silence at a believed address is not proof of
        // absence. Report the best guess and let the TCP connect decide.
        if identifier.probe_type.is_tcp_capable() {
            // A tried-but-silent hint outranks the DNS guess; both were
            // discredited already if something else answered there.
            if let Some(ip) = hint_ip.or(dns_ip) {
                info!(%identifier, %ip, "silent on UDP; falling back to TCP");
                return Ok(FoundProbe { identifier: identifier.clone(), ip, protocol: Protocol::Tcp });
            }
        }

        let reason = match wrong {
            Some(other) => format!("a different probe ({other}) answered at the expected address"),
            None => "no response on any interface".to_string(),
        };
        Err(DiscoveryError::DeviceNotFound { identifier: identifier.clone(), reason })
    }

    /// Sends a wildcard query to `ip` and classifies whatever answers.
    ///
    /// Numeric selectors match on the derived MAC; host-name selectors match
    /// on probe family, since the index is exactly what we are trying to
    /// learn.
    ///
    /// The query always carries the wildcard MAC, even for numeric
    /// selectors: it is the only form that reveals a *wrong* device at the
    /// address, and the only one usable for name selectors. This assumes the
    /// device answers wildcard queries with the same fields as own-MAC ones,
    /// which holds for every probe firmware observed so far.
    async fn verify_at(&self, identifier: &Identifier, ip: Ipv4Addr, budget: Duration) -> Verify {
        let dest = SocketAddrV4::new(ip, self.config.discovery_port);
        let query = DiscoveryPacket::query_ip(MacAddr::WILDCARD);
        let reply = match self.transport.unicast_query(query, dest, budget).await {
            Some(reply) => reply,
            None => return Verify::Silent,
        };
        if reply.packet.mac.is_wildcard() {
            // Echo of our own query or a malformed responder.
            return Verify::Silent;
        }
        let answered = match Identifier::from_mac(reply.packet.mac) {
            Ok(id) => id,
            Err(_) => return Verify::Silent,
        };
        let matches = match identifier.selector {
            Selector::Index(_) => identifier
                .mac_address()
                .map(|mac| mac == reply.packet.mac)
                .unwrap_or(false),
            Selector::Name(_) => answered.probe_type == identifier.probe_type,
        };
        if matches {
            Verify::Confirmed(answered, reply.probe_ip())
        } else {
            Verify::Wrong(answered)
        }
    }
}

/// Resolves a host string: dotted-quad literals short-circuit, anything else
/// goes through the system resolver. Failures are just "no address".
///
/// The system resolver carries its own multi-second timeouts, so the lookup
/// is capped at `budget`; expiry counts as a failed resolution.
async fn resolve_host(host: &str, budget: Duration) -> Option<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(ip);
    }
    let lookup = tokio::time::timeout(budget, tokio::net::lookup_host((host, 0)))
        .await
        .ok()?
        .ok()?;
    lookup.filter_map(|addr| match addr {
        std::net::SocketAddr::V4(v4) => Some(*v4.ip()),
        std::net::SocketAddr::V6(_) => None,
    }).next()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{MockQueryTransport, QueryReply};
    use probelink_core::{MacAddr, ProbeType};

    fn reply_from(mac: MacAddr, ip: [u8; 4]) -> QueryReply {
        let ip = Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]);
        QueryReply {
            packet: DiscoveryPacket::query_ip_reply(mac, ip),
            from: std::net::SocketAddr::V4(SocketAddrV4::new(ip, 59)),
        }
    }

    fn finder(transport: MockQueryTransport) -> ProbeFinder<MockQueryTransport> {
        ProbeFinder::new(Arc::new(transport), FinderConfig::default())
    }

    #[tokio::test]
    async fn test_find_confirms_at_hinted_address() {
        // Arrange: the device at the hint answers with the expected MAC.
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let mac = id.mac_address().unwrap();
        let mut transport = MockQueryTransport::new();
        transport
            .expect_unicast_query()
            .withf(|_, dest, _| *dest.ip() == Ipv4Addr::new(192, 168, 7, 12))
            .returning(move |_, _, _| Some(reply_from(mac, [192, 168, 7, 12])));

        // Act
        let found = finder(transport)
            .find(&id, Some("192.168.7.12"), Duration::from_millis(200))
            .await
            .unwrap();

        // Assert
        assert_eq!(found.ip, Ipv4Addr::new(192, 168, 7, 12));
        assert_eq!(found.protocol, Protocol::Udp);
        assert_eq!(found.identifier, id);
    }

    #[tokio::test]
    async fn test_find_resolves_via_broadcast_when_hint_is_silent() {
        // Arrange: silence at the hint, then a broadcast reply from the
        // target (among chatter from an unrelated probe).
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let mac = id.mac_address().unwrap();
        let other = Identifier::with_index(ProbeType::Dash, 7).mac_address().unwrap();
        let mut transport = MockQueryTransport::new();
        transport.expect_unicast_query().returning(|_, _, _| None);
        transport.expect_broadcast_query().returning(move |_, _, tx| {
            tx.try_send(reply_from(other, [10, 0, 0, 5])).unwrap();
            tx.try_send(reply_from(mac, [10, 0, 0, 9])).unwrap();
        });

        // Act
        let found = finder(transport)
            .find(&id, Some("10.0.0.1"), Duration::from_millis(200))
            .await
            .unwrap();

        // Assert
        assert_eq!(found.ip, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(found.protocol, Protocol::Udp);
    }

    #[tokio::test]
    async fn test_find_reports_wrong_device_at_hint() {
        // Arrange: a Dash answers where we expected a DA-net, and nothing
        // answers the broadcast.
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let intruder = Identifier::with_index(ProbeType::Dash, 7).mac_address().unwrap();
        let mut transport = MockQueryTransport::new();
        transport
            .expect_unicast_query()
            .returning(move |_, _, _| Some(reply_from(intruder, [10, 0, 0, 5])));
        transport.expect_broadcast_query().returning(|_, _, _| ());

        // Act
        let err = finder(transport)
            .find(&id, Some("10.0.0.5"), Duration::from_millis(200))
            .await
            .unwrap_err();

        // Assert
        match err {
            DiscoveryError::DeviceNotFound { reason, .. } => {
                assert!(reason.contains("Dash 7"), "reason was: {reason}");
            }
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_falls_back_to_speculative_tcp_for_sysprobe() {
        // Arrange: a TCP-capable probe that is silent everywhere. The
        // hinted address was never contradicted, so it is still the best
        // guess.
        let id = Identifier::with_index(ProbeType::SysProbe, 71);
        let mut transport = MockQueryTransport::new();
        transport.expect_unicast_query().returning(|_, _, _| None);
        transport.expect_broadcast_query().returning(|_, _, _| ());

        // Act
        let found = finder(transport)
            .find(&id, Some("10.0.0.71"), Duration::from_millis(200))
            .await
            .unwrap();

        // Assert
        assert_eq!(found.protocol, Protocol::Tcp);
        assert_eq!(found.ip, Ipv4Addr::new(10, 0, 0, 71));
    }

    #[tokio::test]
    async fn test_find_does_not_speculate_for_non_tcp_families() {
        // Arrange: same silence, but a DA-net has no TCP control port.
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let mut transport = MockQueryTransport::new();
        transport.expect_unicast_query().returning(|_, _, _| None);
        transport.expect_broadcast_query().returning(|_, _, _| ());

        // Act
        let result = finder(transport)
            .find(&id, Some("10.0.0.35"), Duration::from_millis(200))
            .await;

        // Assert
        assert!(matches!(result, Err(DiscoveryError::DeviceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_find_name_selector_learns_the_index() {
        // Arrange: "SysProbe somehost" — the wildcard query at the host
        // reveals which unit is actually there.
        let id = Identifier::with_name(ProbeType::SysProbe, "10.9.8.7");
        let actual = Identifier::with_index(ProbeType::SysProbe, 71);
        let mac = actual.mac_address().unwrap();
        let mut transport = MockQueryTransport::new();
        transport
            .expect_unicast_query()
            .returning(move |_, _, _| Some(reply_from(mac, [10, 9, 8, 7])));

        // Act
        let found = finder(transport)
            .find(&id, None, Duration::from_millis(200))
            .await
            .unwrap();

        // Assert: the result carries the canonical numeric identifier.
        assert_eq!(found.identifier, actual);
        assert_eq!(found.protocol, Protocol::Udp);
    }

    #[tokio::test]
    async fn test_resolve_host_caps_the_resolver_at_its_budget() {
        // Arrange / Act: a zero budget forces the resolver path to expire
        // immediately; the literal path never consults the resolver at all.
        let started = std::time::Instant::now();
        let resolved = resolve_host("does-not-exist.invalid", Duration::ZERO).await;
        let literal = resolve_host("192.168.7.12", Duration::ZERO).await;

        // Assert
        assert_eq!(resolved, None);
        assert_eq!(literal, Some(Ipv4Addr::new(192, 168, 7, 12)));
        assert!(started.elapsed() < Duration::from_secs(1), "must not wait on the resolver");
    }

    #[tokio::test]
    async fn test_find_returns_within_its_budget_despite_unresolvable_hosts() {
        // Arrange: both the hint and the derived DNS name point nowhere, so
        // every resolution attempt must be bounded by its stage budget.
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let mut transport = MockQueryTransport::new();
        transport.expect_unicast_query().returning(|_, _, _| None);
        transport.expect_broadcast_query().returning(|_, _, _| ());

        // Act
        let started = std::time::Instant::now();
        let result = finder(transport)
            .find(&id, Some("does-not-exist.invalid"), Duration::from_millis(300))
            .await;

        // Assert
        assert!(matches!(result, Err(DiscoveryError::DeviceNotFound { .. })));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "find overran its deadline: {:?}",
            started.elapsed()
        );
    }

    /// Transport whose broadcast never finishes on its own; records whether
    /// its future was dropped (i.e. the task was cancelled).
    struct HangingBroadcastTransport {
        mac: MacAddr,
        broadcast_dropped: Arc<std::sync::atomic::AtomicBool>,
    }

    struct SetOnDrop(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl QueryTransport for HangingBroadcastTransport {
        async fn unicast_query(
            &self,
            _packet: DiscoveryPacket,
            _dest: SocketAddrV4,
            _budget: Duration,
        ) -> Option<crate::application::QueryReply> {
            None
        }

        async fn broadcast_query(
            &self,
            _packet: DiscoveryPacket,
            _budget: Duration,
            replies: mpsc::Sender<crate::application::QueryReply>,
        ) {
            let _guard = SetOnDrop(Arc::clone(&self.broadcast_dropped));
            let _ = replies.send(reply_from(self.mac, [10, 0, 0, 9])).await;
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn test_find_cancels_the_broadcast_task_on_early_success() {
        // Arrange
        let id = Identifier::with_index(ProbeType::DaNet, 35);
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let transport = HangingBroadcastTransport {
            mac: id.mac_address().unwrap(),
            broadcast_dropped: Arc::clone(&dropped),
        };
        let finder = ProbeFinder::new(Arc::new(transport), FinderConfig::default());

        // Act
        let found = finder.find(&id, None, Duration::from_secs(5)).await.unwrap();

        // Assert: success came from the broadcast, and the still-pending
        // broadcast future was torn down rather than left to run out its
        // budget in the background.
        assert_eq!(found.protocol, Protocol::Udp);
        for _ in 0..100 {
            if dropped.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(
            dropped.load(std::sync::atomic::Ordering::SeqCst),
            "broadcast task must not outlive the find call"
        );
    }

    #[tokio::test]
    async fn test_find_rejects_out_of_range_index_without_touching_the_network() {
        // Arrange
        let id = Identifier::with_index(ProbeType::SysProbe, 56_999);
        let transport = MockQueryTransport::new(); // no expectations: no I/O allowed

        // Act
        let err = finder(transport)
            .find(&id, None, Duration::from_millis(200))
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, DiscoveryError::Identifier(IdentifierError::OutOfRange { .. })));
    }
}
