//! Canonical probe identifiers and the text parser.
//!
//! An identifier pairs a [`ProbeType`] with a selector: either a numeric
//! index ("SysProbe 71") or a free-text host name ("gdbserver buildbox").
//! Identifiers are immutable once constructed; every address derivation
//! works from this canonical form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::mac::MacAddr;
use crate::domain::probe_type::{normalize_alias, ProbeType};

/// Errors produced by the identifier codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The text is not a recognisable probe identifier.
    #[error("invalid probe identifier {text:?}: {reason}")]
    InvalidIdentifier { text: String, reason: String },

    /// The index is outside every registered window for this type.
    #[error("{probe_type} index {index} is outside the valid ranges {ranges}")]
    OutOfRange {
        probe_type: ProbeType,
        index: u32,
        /// Human-readable list of the valid `[min, max)` windows.
        ranges: String,
    },

    /// The probe family has no derivable addresses of the requested kind.
    #[error("{probe_type} probes have no derivable {what}")]
    UnsupportedType {
        probe_type: ProbeType,
        what: &'static str,
    },

    /// Address derivation was requested for a name selector.
    #[error("identifier {0:?} has a host-name selector; addresses can only be derived from a numeric index")]
    NotNumeric(String),

    /// Reverse MAC lookup found no owning window.
    #[error("no probe type claims MAC address {0}")]
    UnknownMac(MacAddr),

    /// Reverse DNS lookup matched no hostname template.
    #[error("hostname {0:?} does not match any probe DNS template")]
    UnknownHostname(String),

    /// Reverse serial lookup matched no known serial prefix.
    #[error("hardware serial {0:?} does not match any known probe serial prefix")]
    UnknownSerial(String),
}

/// The part of an identifier that picks out one probe within its family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// Numeric index within the family's address windows.
    Index(u32),
    /// Host name or dotted-quad literal, compared case-sensitively.
    Name(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Index(i) => write!(f, "{i}"),
            Selector::Name(n) => f.write_str(n),
        }
    }
}

/// Canonical reference to a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub probe_type: ProbeType,
    pub selector: Selector,
}

impl Identifier {
    /// Creates an identifier with a numeric index.
    pub fn with_index(probe_type: ProbeType, index: u32) -> Self {
        Identifier { probe_type, selector: Selector::Index(index) }
    }

    /// Creates an identifier with a host-name selector.
    pub fn with_name(probe_type: ProbeType, name: impl Into<String>) -> Self {
        Identifier { probe_type, selector: Selector::Name(name.into()) }
    }

    /// Numeric index, if this identifier has one.
    pub fn index(&self) -> Option<u32> {
        match &self.selector {
            Selector::Index(i) => Some(*i),
            Selector::Name(_) => None,
        }
    }

    /// Host-name selector, if this identifier has one.
    pub fn name(&self) -> Option<&str> {
        match &self.selector {
            Selector::Index(_) => None,
            Selector::Name(n) => Some(n.as_str()),
        }
    }

    /// Parses a user-typed identifier.
    ///
    /// Accepted forms:
    /// - `"<type><index>"` with no separator (`sp71`, `danet35`);
    /// - `"<type> <index>"` (`SysProbe 71`, `DAnet 35`);
    /// - `"<type> <name>"` where the trailing token is not a number
    ///   (`gdbserver buildbox`, `DA-net 192.168.7.12`).
    ///
    /// Type names are case- and hyphen-insensitive.
    pub fn parse(text: &str) -> Result<Identifier, IdentifierError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(invalid(text, "empty string"));
        }

        if let Some((head, tail)) = trimmed.split_once(char::is_whitespace) {
            let probe_type = ProbeType::from_alias(head)
                .ok_or_else(|| invalid(text, &format!("unknown probe type {head:?}")))?;
            let selector = parse_selector(tail.trim())
                .ok_or_else(|| invalid(text, "missing selector after probe type"))?;
            return Ok(Identifier { probe_type, selector });
        }

        // Compact form: an alias immediately followed by digits. Longest
        // alias wins so "sysprobe71" never resolves through "sp".
        let normalized = normalize_alias(trimmed);
        let mut best: Option<(usize, ProbeType, u32)> = None;
        for (alias, probe_type) in ProbeType::alias_table() {
            if let Some(rest) = normalized.strip_prefix(alias) {
                if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
                    continue;
                }
                if let Ok(index) = rest.parse::<u32>() {
                    if best.map_or(true, |(len, _, _)| alias.len() > len) {
                        best = Some((alias.len(), *probe_type, index));
                    }
                }
            }
        }
        match best {
            Some((_, probe_type, index)) => Ok(Identifier::with_index(probe_type, index)),
            None => Err(invalid(text, "expected \"<type><index>\" or \"<type> <selector>\"")),
        }
    }
}

fn invalid(text: &str, reason: &str) -> IdentifierError {
    IdentifierError::InvalidIdentifier { text: text.to_string(), reason: reason.to_string() }
}

fn parse_selector(token: &str) -> Option<Selector> {
    if token.is_empty() {
        return None;
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        // Over-long digit runs cannot be an index; treat them as a name so
        // that numeric-looking host labels still parse.
        if let Ok(index) = token.parse::<u32>() {
            return Some(Selector::Index(index));
        }
    }
    Some(Selector::Name(token.to_string()))
}

impl fmt::Display for Identifier {
    /// Canonical text form: `"<CanonicalType> <selector>"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.probe_type, self.selector)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}
