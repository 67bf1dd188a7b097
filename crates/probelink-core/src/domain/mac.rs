//! Fixed-size MAC address value type.
//!
//! Probe MAC addresses are computed by OR-ing a numeric index into the low
//! bytes of a per-type base address, so the type carries a bitwise OR and an
//! integer view over the 48 address bits. Byte strings are never used for
//! address arithmetic.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of bytes in a MAC address.
pub const MAC_LEN: usize = 6;

/// A 48-bit Ethernet MAC address.
///
/// The all-zero address is the discovery protocol's wildcard ("any probe").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MacAddr(pub [u8; MAC_LEN]);

/// Error returned when a MAC address string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address {0:?}: expected six hex octets separated by '-' or ':'")]
pub struct MacParseError(pub String);

impl MacAddr {
    /// The wildcard address used to query "any probe".
    pub const WILDCARD: MacAddr = MacAddr([0; MAC_LEN]);

    /// Creates an address from raw octets.
    pub const fn new(octets: [u8; MAC_LEN]) -> Self {
        MacAddr(octets)
    }

    /// Returns `true` for the all-zero wildcard address.
    pub fn is_wildcard(&self) -> bool {
        self.0 == [0; MAC_LEN]
    }

    /// Returns the raw octets in network order.
    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    /// Returns the address as an integer with the first octet in the most
    /// significant position.
    pub fn as_u64(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    /// Builds an address from the low 48 bits of `value`.
    pub fn from_u64(value: u64) -> Self {
        let mut octets = [0u8; MAC_LEN];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = ((value >> (8 * (MAC_LEN - 1 - i))) & 0xFF) as u8;
        }
        MacAddr(octets)
    }
}

impl BitOr for MacAddr {
    type Output = MacAddr;

    /// Per-byte bitwise OR. Used to merge an index offset into a base
    /// address whose high octets act as a fixed vendor/class prefix.
    fn bitor(self, rhs: MacAddr) -> MacAddr {
        let mut octets = [0u8; MAC_LEN];
        for i in 0..MAC_LEN {
            octets[i] = self.0[i] | rhs.0[i];
        }
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    /// Parses `aa-bb-cc-dd-ee-ff` or `aa:bb:cc:dd:ee:ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else {
            s.split('-').collect()
        };
        if parts.len() != MAC_LEN {
            return Err(MacParseError(s.to_string()));
        }
        let mut octets = [0u8; MAC_LEN];
        for (i, part) in parts.iter().enumerate() {
            octets[i] =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }
        Ok(MacAddr(octets))
    }
}
