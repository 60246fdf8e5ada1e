pub mod ethernet;
pub mod ipv4;
pub mod tcp;

use crate::capture::{LinkType, RawPacket, Timestamp};
use crate::config::DecodeConfig;
use std::fmt;
use std::net::Ipv4Addr;

/// Link-layer payload types the decoder branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    VlanTagged,
    Other(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x8100 => EtherType::VlanTagged,
            other => EtherType::Other(other),
        }
    }
}

impl EtherType {
    pub fn as_u16(&self) -> u16 {
        match *self {
            EtherType::Ipv4 => 0x0800,
            EtherType::Ipv6 => 0x86DD,
            EtherType::VlanTagged => 0x8100,
            EtherType::Other(v) => v,
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::Ipv4 => f.write_str("IPv4"),
            EtherType::Ipv6 => f.write_str("IPv6"),
            EtherType::VlanTagged => f.write_str("802.1Q"),
            EtherType::Other(v) => write!(f, "0x{:04x}", v),
        }
    }
}

/// IPv4 protocol field; only TCP is decoded further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Tcp,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            6 => IpProtocol::Tcp,
            other => IpProtocol::Other(other),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::Tcp => f.write_str("TCP"),
            IpProtocol::Other(v) => write!(f, "proto {}", v),
        }
    }
}

/// Errors from decoding a single packet. The packet is dropped; the capture
/// as a whole keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes to parse the header
    TooShort {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Header fields that contradict each other or the captured length
    InvalidHeader(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort {
                layer,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "{} header too short: need {} bytes, got {}",
                    layer, expected, actual
                )
            }
            DecodeError::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// The TCP fields of one packet, copied out of the capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSegment {
    pub timestamp: Timestamp,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: tcp::TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    /// TCP payload bytes: IP total length minus both header lengths.
    pub payload_len: u32,
    /// The record was cut by the snaplen and accepted under
    /// [`DecodeConfig::accept_snapped`]; part of the payload was never captured.
    pub snapped: bool,
}

/// Outcome of decoding one raw packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Segment(DecodedSegment),
    /// Link layer carries something other than IPv4 (ARP, IPv6, ...).
    NotIpv4 { ether_type: u16 },
    /// IPv4 datagram for another transport protocol.
    NotTcp { protocol: u8 },
    /// Non-first IPv4 fragment; it carries no TCP header.
    Fragment,
}

/// Decode link, IPv4 and TCP headers of a raw packet.
///
/// Non-IPv4 and non-TCP traffic is classified rather than rejected. Only
/// structurally inconsistent headers produce a `DecodeError`.
pub fn decode(
    link: LinkType,
    packet: &RawPacket,
    config: &DecodeConfig,
) -> Result<Decoded, DecodeError> {
    let data = packet.data.as_slice();

    let ip_data = match link {
        LinkType::Ethernet => {
            let eth = ethernet::EthernetFrame::parse(data, config.vlan)?;
            if eth.ether_type() != EtherType::Ipv4 {
                tracing::trace!(frame = %eth, "skipping non-IPv4 frame");
                return Ok(Decoded::NotIpv4 {
                    ether_type: eth.ether_type().as_u16(),
                });
            }
            eth.payload()
        }
        LinkType::RawIpv4 => {
            if data.first().map(|b| b >> 4) == Some(6) {
                return Ok(Decoded::NotIpv4 {
                    ether_type: EtherType::Ipv6.as_u16(),
                });
            }
            data
        }
    };

    let ip = ipv4::Ipv4Header::parse(ip_data)?;

    let cut = if config.accept_snapped {
        packet.original_len.saturating_sub(packet.captured_len) as usize
    } else {
        0
    };
    ip.check_total_length(ip_data.len() + cut)?;
    let snapped = ip.total_length() as usize > ip_data.len();

    if ip.is_later_fragment() {
        return Ok(Decoded::Fragment);
    }
    if ip.protocol() != IpProtocol::Tcp {
        return Ok(Decoded::NotTcp {
            protocol: ip.protocol_raw(),
        });
    }

    // `payload()` is clamped to the total length, so a data offset reaching
    // past the datagram fails here as too short.
    let segment = tcp::TcpHeader::parse(ip.payload())?;

    tracing::trace!(ip = %ip, tcp = %segment, "decoded segment");

    Ok(Decoded::Segment(DecodedSegment {
        timestamp: packet.timestamp,
        src_ip: ip.src_addr(),
        dst_ip: ip.dst_addr(),
        src_port: segment.src_port(),
        dst_port: segment.dst_port(),
        flags: segment.flags(),
        seq: segment.sequence_number(),
        ack: segment.ack_number(),
        window: segment.window_size(),
        payload_len: (ip.payload_len() - segment.header_len()) as u32,
        snapped,
    }))
}
