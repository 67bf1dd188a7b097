//! # probelink-core
//!
//! Shared library for Probelink containing the probe identifier model, the
//! static address-range table, and the UDP discovery packet codec.
//!
//! This crate is used by the finder application and by anything else that
//! needs to name probes. It has zero dependencies on sockets or the OS; all
//! networking lives in `probelink-finder`.
//!
//! # Architecture overview (for beginners)
//!
//! Hardware debug probes ship with nothing but a type and a unit number
//! stamped on the case ("SysProbe 71"). Everything else about the device is
//! *derived* from that pair:
//!
//! - **`domain`** – The [`Identifier`] type (probe family plus a numeric
//!   index or a host name), the parser for user-typed forms like `sp71`, and
//!   the derivations to and from MAC address, DNS hostname, and hardware
//!   serial. All six mappings are driven by one static table, [`RANGES`].
//!
//! - **`protocol`** – The 14-byte binary discovery packet exchanged over UDP
//!   broadcast, plus its operation codes.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `probelink_core::Identifier` instead of the full module path.
pub use domain::identifier::{Identifier, IdentifierError, Selector};
pub use domain::mac::{MacAddr, MacParseError, MAC_LEN};
pub use domain::probe_type::{NumericTemplate, ProbeType, ProbeTypeRange, RANGES};
pub use protocol::packet::{
    DiscoveryPacket, OpCode, PacketError, PacketIdent, CONTROL_PORT, DISCOVERY_PORT, PACKET_SIZE,
};
