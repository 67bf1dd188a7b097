//! Address derivation: MAC, DNS hostname, and hardware serial.
//!
//! All six mappings are driven by the static [`RANGES`] table. The forward
//! direction substitutes the index into the matched window; the reverse
//! direction scans the table and is a total inverse for every in-range
//! identifier (see the round-trip tests in `tests/identifier_roundtrip.rs`).

use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::domain::identifier::{Identifier, IdentifierError};
use crate::domain::mac::MacAddr;
use crate::domain::probe_type::{ProbeTypeRange, RANGES};

impl Identifier {
    /// Derives the probe's MAC address by OR-ing the index offset into the
    /// base address of its window.
    pub fn mac_address(&self) -> Result<MacAddr, IdentifierError> {
        let (index, range) = self.lookup_range("MAC address")?;
        let offset = u64::from(index - range.min);
        Ok(MacAddr::from_u64(range.base_mac.as_u64() | offset))
    }

    /// Reverse MAC lookup. The first window whose MAC interval contains
    /// `mac` wins; the table is ordered and interval-disjoint, so the match
    /// is unique.
    pub fn from_mac(mac: MacAddr) -> Result<Identifier, IdentifierError> {
        let value = mac.as_u64();
        for range in RANGES {
            if range.mac_low() <= value && value <= range.mac_high() {
                let index = (value - range.mac_low()) as u32 + range.min;
                trace!(%mac, probe_type = %range.probe_type, index, "reverse MAC match");
                return Ok(Identifier::with_index(range.probe_type, index));
            }
        }
        Err(IdentifierError::UnknownMac(mac))
    }

    /// Derives the probe's DNS hostname from its window's template.
    pub fn dns_name(&self) -> Result<String, IdentifierError> {
        let (index, range) = self.lookup_range("DNS name")?;
        let template = range.dns.ok_or(IdentifierError::UnsupportedType {
            probe_type: self.probe_type,
            what: "DNS name",
        })?;
        Ok(template.format(index))
    }

    /// Reverse DNS lookup. Matches the bare hostname or a fully qualified
    /// name (`imgda-eth00035.le.example.org`), case-insensitively.
    pub fn from_dns(hostname: &str) -> Result<Identifier, IdentifierError> {
        for (range, re) in dns_patterns() {
            if let Some(caps) = re.captures(hostname) {
                if let Ok(index) = caps[1].parse::<u32>() {
                    return Ok(Identifier::with_index(range.probe_type, index));
                }
            }
        }
        Err(IdentifierError::UnknownHostname(hostname.to_string()))
    }

    /// Derives the vendor-assigned hardware serial, a fixed-width string of
    /// the window's prefix followed by the zero-padded index.
    pub fn hardware_serial(&self) -> Result<String, IdentifierError> {
        let (index, range) = self.lookup_range("hardware serial")?;
        let template = range.serial.ok_or(IdentifierError::UnsupportedType {
            probe_type: self.probe_type,
            what: "hardware serial",
        })?;
        Ok(template.format(index))
    }

    /// Reverse serial lookup, anchored on the known prefixes
    /// (case-insensitive) followed by a trailing digit run.
    pub fn from_hardware_serial(serial: &str) -> Result<Identifier, IdentifierError> {
        for (range, re) in serial_patterns() {
            if let Some(caps) = re.captures(serial) {
                if let Ok(index) = caps[1].parse::<u32>() {
                    return Ok(Identifier::with_index(range.probe_type, index));
                }
            }
        }
        Err(IdentifierError::UnknownSerial(serial.to_string()))
    }

    /// Finds the window containing this identifier's index.
    ///
    /// Fails with `NotNumeric` for name selectors, `UnsupportedType` when
    /// the family has no windows at all, and `OutOfRange` (listing the valid
    /// windows) when the index misses every window.
    fn lookup_range(
        &self,
        what: &'static str,
    ) -> Result<(u32, &'static ProbeTypeRange), IdentifierError> {
        let index = self
            .index()
            .ok_or_else(|| IdentifierError::NotNumeric(self.to_string()))?;
        let mut windows = Vec::new();
        for range in self.probe_type.ranges() {
            if range.contains(index) {
                return Ok((index, range));
            }
            windows.push(format!("[{}, {})", range.min, range.max));
        }
        if windows.is_empty() {
            Err(IdentifierError::UnsupportedType { probe_type: self.probe_type, what })
        } else {
            Err(IdentifierError::OutOfRange {
                probe_type: self.probe_type,
                index,
                ranges: windows.join(", "),
            })
        }
    }
}

/// Compiled reverse-lookup patterns, built once from the static table.
fn dns_patterns() -> &'static [(&'static ProbeTypeRange, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static ProbeTypeRange, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RANGES
            .iter()
            .filter_map(|range| {
                let template = range.dns?;
                let pattern = format!(
                    r"(?i)^{}(\d{{{}}})(?:\..*)?$",
                    regex::escape(template.prefix),
                    template.digits
                );
                Some((range, Regex::new(&pattern).expect("static DNS pattern")))
            })
            .collect()
    })
}

fn serial_patterns() -> &'static [(&'static ProbeTypeRange, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static ProbeTypeRange, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RANGES
            .iter()
            .filter_map(|range| {
                let template = range.serial?;
                let pattern = format!(
                    r"(?i)^{}(\d{{1,{}}})$",
                    regex::escape(template.prefix),
                    template.digits
                );
                Some((range, Regex::new(&pattern).expect("static serial pattern")))
            })
            .collect()
    })
}
