//! Domain types: probe families, identifiers, and derived addresses.

pub mod addressing;
pub mod identifier;
pub mod mac;
pub mod probe_type;
