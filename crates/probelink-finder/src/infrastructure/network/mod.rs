//! Network infrastructure for the finder.
//!
//! # Sub-modules
//!
//! - **`interfaces`** – Enumerates local IPv4 interfaces and their broadcast
//!   addresses, so discovery reaches every attached subnet.
//! - **`transport`** – The real [`QueryTransport`]: unicast and broadcast
//!   UDP query/reply exchanges with retry and deadline handling.
//! - **`responder`** – Answers discovery queries on behalf of a software
//!   probe hosted on this machine.
//! - **`tcp`** – Reachability check for speculative TCP resolutions.
//!
//! [`QueryTransport`]: crate::application::QueryTransport

pub mod interfaces;
pub mod responder;
pub mod tcp;
pub mod transport;
