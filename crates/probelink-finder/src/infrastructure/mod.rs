//! Infrastructure layer for the finder.
//!
//! Contains OS-facing adapters: UDP sockets, interface enumeration, the
//! discovery responder, and the TCP reachability check.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `probelink_core`, but MUST NOT be imported by the application layer.

pub mod network;
