//! Wire protocol for probe discovery over UDP.

pub mod packet;
