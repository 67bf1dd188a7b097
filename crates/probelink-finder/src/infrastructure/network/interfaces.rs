//! Local IPv4 interface enumeration.
//!
//! Broadcast discovery must go out on every attached subnet, not just the
//! default route, because lab probes often sit on a secondary NIC.

use std::net::Ipv4Addr;

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use tracing::{debug, warn};

/// One usable IPv4 interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    /// Address to bind the outbound socket to.
    pub addr: Ipv4Addr,
    /// Directed broadcast address of the attached subnet.
    pub broadcast: Ipv4Addr,
}

/// Enumerates non-loopback IPv4 interfaces that can carry a broadcast.
///
/// Interfaces without a broadcast address fall back to one computed from the
/// netmask; enumeration failure yields an empty list (the transport still
/// has the limited broadcast to fall back on).
pub fn local_interfaces() -> Vec<LocalInterface> {
    let interfaces = match NetworkInterface::show() {
        Ok(list) => list,
        Err(e) => {
            warn!("failed to enumerate network interfaces: {e}");
            return Vec::new();
        }
    };

    let mut result = Vec::new();
    for iface in interfaces {
        for addr in &iface.addr {
            let Addr::V4(v4) = addr else { continue };
            if v4.ip.is_loopback() {
                continue;
            }
            let broadcast = match (v4.broadcast, v4.netmask) {
                (Some(b), _) => b,
                (None, Some(mask)) => directed_broadcast(v4.ip, mask),
                (None, None) => continue,
            };
            debug!(name = %iface.name, addr = %v4.ip, %broadcast, "usable interface");
            result.push(LocalInterface { name: iface.name.clone(), addr: v4.ip, broadcast });
        }
    }
    result
}

/// Computes the directed broadcast for `addr` under `mask`.
fn directed_broadcast(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) | !u32::from(mask))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
