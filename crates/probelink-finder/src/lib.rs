//! # probelink-finder
//!
//! Locates hardware debug probes on the network: UDP broadcast discovery,
//! unicast identification, the multi-stage `find` resolution pipeline, and a
//! responder that lets a host advertise a software probe.
//!
//! The crate follows a two-layer split:
//!
//! - **`application`** – The use cases (`find`, `identify`, `discover`) built
//!   on the [`application::QueryTransport`] trait, so the network can be
//!   mocked in tests.
//! - **`infrastructure`** – The real sockets: broadcast/unicast UDP
//!   transport, interface enumeration, the discovery responder, and the TCP
//!   reachability check.

use std::time::Duration;

use probelink_core::{CONTROL_PORT, DISCOVERY_PORT};

pub mod application;
pub mod infrastructure;

/// Tunable parameters shared by every finder use case.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// UDP port probes answer discovery queries on.
    pub discovery_port: u16,
    /// TCP port used for speculative reachability checks.
    pub control_port: u16,
    /// Number of send attempts per query exchange; the exchange budget is
    /// split evenly across them.
    pub retries: u32,
    /// Overall time budget when the caller does not supply one.
    pub default_timeout: Duration,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            control_port: CONTROL_PORT,
            retries: 3,
            default_timeout: Duration::from_secs(3),
        }
    }
}
