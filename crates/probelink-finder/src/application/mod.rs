//! Application layer use cases for the finder.
//!
//! Use cases in this layer orchestrate the discovery protocol without
//! touching sockets directly; all network I/O goes through the
//! [`QueryTransport`] trait so tests can substitute a mock.
//!
//! # Sub-modules
//!
//! - **`find`** – Resolves one identifier to a reachable IP address via the
//!   multi-stage pipeline (hint, broadcast, DNS, speculative TCP).
//! - **`identify`** – The inverse: asks the device at a known IP who it is.
//! - **`discover`** – Streams every probe that answers a broadcast query.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use probelink_core::{DiscoveryPacket, Identifier, IdentifierError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod discover;
pub mod find;
pub mod identify;

/// Errors surfaced by the finder use cases.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// `find` exhausted every resolution stage.
    #[error("device {identifier} not found: {reason}")]
    DeviceNotFound { identifier: Identifier, reason: String },

    /// `identify` got no answer from the queried address.
    #[error("no probe answered at {0}")]
    ProbeNotFound(Ipv4Addr),

    /// The identifier itself is unusable (bad index, underivable address).
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

/// Transport the resolved probe should be contacted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("udp"),
            Protocol::Tcp => f.write_str("tcp"),
        }
    }
}

/// A successfully resolved probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundProbe {
    pub identifier: Identifier,
    pub ip: Ipv4Addr,
    pub protocol: Protocol,
}

/// One discovery reply together with the address it arrived from.
///
/// A reply with an unspecified `packet.ip` identifies itself by its source
/// address instead; [`QueryReply::probe_ip`] folds the two together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryReply {
    pub packet: DiscoveryPacket,
    pub from: SocketAddr,
}

impl QueryReply {
    /// The probe's IP: the packet field when set, else the datagram source.
    pub fn probe_ip(&self) -> Ipv4Addr {
        if !self.packet.ip.is_unspecified() {
            return self.packet.ip;
        }
        match self.from {
            SocketAddr::V4(v4) => *v4.ip(),
            SocketAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Abstraction over the UDP query/reply exchange.
///
/// Implementations swallow transient socket errors; a lost datagram and an
/// unreachable network both surface as "no reply".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Sends `packet` to `dest` and waits up to `budget` for one decodable
    /// reply, resending on the configured retry schedule.
    async fn unicast_query(
        &self,
        packet: DiscoveryPacket,
        dest: SocketAddrV4,
        budget: Duration,
    ) -> Option<QueryReply>;

    /// Broadcasts `packet` on every eligible interface and forwards each
    /// decodable reply until `budget` expires or the receiver is dropped.
    async fn broadcast_query(
        &self,
        packet: DiscoveryPacket,
        budget: Duration,
        replies: mpsc::Sender<QueryReply>,
    );
}
