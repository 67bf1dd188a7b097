//! Binary codec for the UDP discovery packet.
//!
//! Wire format (UDP port 59, all integers big-endian):
//! ```text
//! [ident:2][op:2][mac:6][ip:4]
//! ```
//! Total size: 14 bytes. `ident` is `0xdada` for command packets and
//! `0xc0c0` for configuration packets; discovery queries are sent with the
//! configuration ident and op `query_ip`. An all-zero MAC is the wildcard
//! ("any probe") and an all-zero IP means "use the datagram's source
//! address".

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::domain::mac::MacAddr;

/// Size of every discovery packet on the wire.
pub const PACKET_SIZE: usize = 14;

/// UDP port probes listen on for discovery queries.
pub const DISCOVERY_PORT: u16 = 59;

/// TCP control port used to confirm speculative resolutions.
pub const CONTROL_PORT: u16 = 9999;

/// Errors that can occur while decoding a discovery packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The datagram is shorter than the fixed packet size.
    #[error("short packet: need {PACKET_SIZE} bytes, got {0}")]
    Truncated(usize),

    /// The ident field is neither the command nor the config marker.
    #[error("unknown packet ident: 0x{0:04x}")]
    UnknownIdent(u16),

    /// The op field is not a recognised operation.
    #[error("unknown packet op: 0x{0:04x}")]
    UnknownOp(u16),
}

/// Packet class marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketIdent {
    Command = 0xDADA,
    Config = 0xC0C0,
}

impl TryFrom<u16> for PacketIdent {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0xDADA => Ok(PacketIdent::Command),
            0xC0C0 => Ok(PacketIdent::Config),
            _ => Err(()),
        }
    }
}

/// Operation codes carried in the packet's op field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OpCode {
    /// "Who are you" / "are you at this address".
    QueryIp = 1,
    /// Assign a static IP to the addressed probe.
    ForceIp = 2,
    DhcpOn = 3,
    DhcpOff = 4,
    TcpEnabled = 5,
}

impl TryFrom<u16> for OpCode {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpCode::QueryIp),
            2 => Ok(OpCode::ForceIp),
            3 => Ok(OpCode::DhcpOn),
            4 => Ok(OpCode::DhcpOff),
            5 => Ok(OpCode::TcpEnabled),
            _ => Err(()),
        }
    }
}

/// One discovery datagram, either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPacket {
    pub ident: PacketIdent,
    pub op: OpCode,
    /// Addressed (outbound) or reporting (inbound) probe MAC; wildcard
    /// addresses every probe.
    pub mac: MacAddr,
    /// Probe IP; `0.0.0.0` means "unspecified, use the source address".
    pub ip: Ipv4Addr,
}

impl DiscoveryPacket {
    /// Builds a `query_ip` packet addressed to `mac` (or to every probe,
    /// with the wildcard).
    pub fn query_ip(mac: MacAddr) -> Self {
        DiscoveryPacket {
            ident: PacketIdent::Config,
            op: OpCode::QueryIp,
            mac,
            ip: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Builds the reply a probe sends to a `query_ip`.
    pub fn query_ip_reply(mac: MacAddr, ip: Ipv4Addr) -> Self {
        DiscoveryPacket { ident: PacketIdent::Command, op: OpCode::QueryIp, mac, ip }
    }

    /// Encodes into the fixed 14-byte wire form.
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[0..2].copy_from_slice(&(self.ident as u16).to_be_bytes());
        buf[2..4].copy_from_slice(&(self.op as u16).to_be_bytes());
        buf[4..10].copy_from_slice(&self.mac.octets());
        buf[10..14].copy_from_slice(&self.ip.octets());
        buf
    }

    /// Decodes a packet from the start of `bytes`.
    ///
    /// Trailing bytes are ignored so peers that pad their datagrams still
    /// interoperate.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < PACKET_SIZE {
            return Err(PacketError::Truncated(bytes.len()));
        }
        let ident_raw = u16::from_be_bytes([bytes[0], bytes[1]]);
        let ident =
            PacketIdent::try_from(ident_raw).map_err(|_| PacketError::UnknownIdent(ident_raw))?;
        let op_raw = u16::from_be_bytes([bytes[2], bytes[3]]);
        let op = OpCode::try_from(op_raw).map_err(|_| PacketError::UnknownOp(op_raw))?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[4..10]);
        let ip = Ipv4Addr::new(bytes[10], bytes[11], bytes[12], bytes[13]);
        Ok(DiscoveryPacket { ident, op, mac: MacAddr::new(mac), ip })
    }
}
