//! The `discover` use case: enumerate every probe that answers a broadcast.
//!
//! Replies are deduplicated by MAC, since a probe reachable over several
//! interfaces answers the query once per interface.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use probelink_core::{DiscoveryPacket, Identifier, MacAddr};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::application::{FoundProbe, Protocol, QueryTransport};

/// Broadcasts a wildcard query and streams each distinct responding probe.
///
/// The stream ends when `timeout` expires. Replies whose MAC maps to no
/// known probe family are logged and skipped rather than ending the sweep.
pub fn discover<T: QueryTransport + 'static>(
    transport: Arc<T>,
    timeout: Duration,
) -> mpsc::Receiver<FoundProbe> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let (reply_tx, mut reply_rx) = mpsc::channel(64);
        let broadcast = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                let query = DiscoveryPacket::query_ip(MacAddr::WILDCARD);
                transport.broadcast_query(query, timeout, reply_tx).await;
            })
        };

        let mut seen: HashSet<MacAddr> = HashSet::new();
        while let Some(reply) = reply_rx.recv().await {
            if reply.packet.mac.is_wildcard() {
                trace!(from = %reply.from, "ignoring wildcard reply (query echo)");
                continue;
            }
            if !seen.insert(reply.packet.mac) {
                continue;
            }
            match Identifier::from_mac(reply.packet.mac) {
                Ok(identifier) => {
                    let probe = FoundProbe {
                        identifier,
                        ip: reply.probe_ip(),
                        protocol: Protocol::Udp,
                    };
                    if tx.send(probe).await.is_err() {
                        // Receiver dropped; the caller has seen enough.
                        break;
                    }
                }
                Err(e) => debug!(mac = %reply.packet.mac, "unrecognised responder: {e}"),
            }
        }

        broadcast.abort();
    });

    rx
}

// ── Tests ─────────────────────────────────────────────────────────────────────
