//! TCP reachability check for speculative resolutions.
//!
//! A speculative result says "the probe should be here, but it is not
//! answering UDP". Before reporting success the finder opens (and
//! immediately closes) a TCP connection to the control port; a probe whose
//! session is busy still accepts the connect.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Returns `true` if something accepts a TCP connection at `ip:port` within
/// `budget`.
pub async fn confirm_tcp(ip: Ipv4Addr, port: u16, budget: Duration) -> bool {
    match tokio::time::timeout(budget, TcpStream::connect((ip, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(%ip, port, "TCP confirm failed: {e}");
            false
        }
        Err(_) => {
            debug!(%ip, port, "TCP confirm timed out");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
