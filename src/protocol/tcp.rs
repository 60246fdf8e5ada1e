//! TCP segment header: ports, sequence space, control bits and window.

use super::DecodeError;
use std::fmt;

pub const TCP_MIN_HEADER_LEN: usize = 20;

/// Control bit masks as they appear in byte 13 of the header.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// Control bits of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub fn from_bits(bits: u8) -> Self {
        let set = |mask: u8| bits & mask != 0;
        TcpFlags {
            syn: set(flags::SYN),
            ack: set(flags::ACK),
            fin: set(flags::FIN),
            rst: set(flags::RST),
            psh: set(flags::PSH),
            urg: set(flags::URG),
        }
    }

    /// A connection-opening SYN, as opposed to the SYN/ACK reply.
    pub fn is_pure_syn(&self) -> bool {
        self.syn && !self.ack
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.syn, "SYN"),
            (self.ack, "ACK"),
            (self.fin, "FIN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.urg, "URG"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", set.join(", "))
    }
}

/// Borrowed view of a TCP header. Options are covered by
/// [`header_len`](Self::header_len) but not decoded.
#[derive(Debug)]
pub struct TcpHeader<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        let too_short = |expected: usize| DecodeError::TooShort {
            layer: "TCP",
            expected,
            actual: data.len(),
        };

        if data.len() < TCP_MIN_HEADER_LEN {
            return Err(too_short(TCP_MIN_HEADER_LEN));
        }
        let header_len = usize::from(data[12] >> 4) * 4;
        if header_len < TCP_MIN_HEADER_LEN {
            return Err(DecodeError::InvalidHeader(format!(
                "TCP data offset of {} bytes is below the 20-byte minimum",
                header_len
            )));
        }
        if data.len() < header_len {
            return Err(too_short(header_len));
        }

        Ok(TcpHeader { data, header_len })
    }

    fn be16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self.data[at], self.data[at + 1]])
    }

    fn be32(&self, at: usize) -> u32 {
        u32::from_be_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ])
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.be16(0)
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.be16(2)
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        self.be32(4)
    }

    #[inline]
    pub fn ack_number(&self) -> u32 {
        self.be32(8)
    }

    /// Bytes, options included.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    #[inline]
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bits(self.data[13])
    }

    /// Advertised receive window, without any scale factor applied.
    #[inline]
    pub fn window_size(&self) -> u16 {
        self.be16(14)
    }
}

impl<'a> fmt::Display for TcpHeader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} {} seq={} ack={} win={}",
            self.src_port(),
            self.dst_port(),
            self.flags(),
            self.sequence_number(),
            self.ack_number(),
            self.window_size()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 49152 -> 80, seq 1000, SYN, window 65535.
    fn make_tcp_syn() -> Vec<u8> {
        let mut pkt = vec![0u8; TCP_MIN_HEADER_LEN];
        pkt[0..2].copy_from_slice(&49152u16.to_be_bytes());
        pkt[2..4].copy_from_slice(&80u16.to_be_bytes());
        pkt[4..8].copy_from_slice(&1000u32.to_be_bytes());
        pkt[12] = 5 << 4;
        pkt[13] = flags::SYN;
        pkt[14..16].copy_from_slice(&u16::MAX.to_be_bytes());
        pkt
    }

    #[test]
    fn parse_tcp_syn() {
        let pkt = make_tcp_syn();
        let hdr = TcpHeader::parse(&pkt).unwrap();
        assert_eq!(hdr.src_port(), 49152);
        assert_eq!(hdr.dst_port(), 80);
        assert_eq!(hdr.sequence_number(), 1000);
        assert_eq!(hdr.ack_number(), 0);
        assert_eq!(hdr.header_len(), 20);
        let f = hdr.flags();
        assert!(f.syn);
        assert!(!f.ack && !f.fin && !f.rst);
        assert_eq!(hdr.window_size(), 65535);
        assert_eq!(f.to_string(), "[SYN]");
    }

    #[test]
    fn flags_string_lists_every_set_bit() {
        let f = TcpFlags::from_bits(flags::FIN | flags::ACK | flags::PSH | flags::URG);
        assert_eq!(f.to_string(), "[ACK, FIN, PSH, URG]");
        assert_eq!(TcpFlags::from_bits(0).to_string(), "[]");
    }

    #[test]
    fn pure_syn_excludes_syn_ack() {
        assert!(TcpFlags::from_bits(flags::SYN).is_pure_syn());
        assert!(!TcpFlags::from_bits(flags::SYN | flags::ACK).is_pure_syn());
        assert!(!TcpFlags::from_bits(flags::ACK).is_pure_syn());
    }

    #[test]
    fn header_display() {
        let pkt = make_tcp_syn();
        assert_eq!(
            TcpHeader::parse(&pkt).unwrap().to_string(),
            "49152->80 [SYN] seq=1000 ack=0 win=65535"
        );
    }

    #[test]
    fn options_extend_header_length() {
        let mut pkt = make_tcp_syn();
        pkt[12] = 0x80; // 32-byte header
        pkt.extend_from_slice(&[1u8; 12]);
        assert_eq!(TcpHeader::parse(&pkt).unwrap().header_len(), 32);
    }

    #[test]
    fn reject_short_tcp() {
        assert_eq!(
            TcpHeader::parse(&[0u8; 19]).unwrap_err(),
            DecodeError::TooShort {
                layer: "TCP",
                expected: 20,
                actual: 19
            }
        );
        let mut pkt = make_tcp_syn();
        pkt[12] = 0x60;
        assert!(matches!(
            TcpHeader::parse(&pkt),
            Err(DecodeError::TooShort { expected: 24, .. })
        ));
    }

    #[test]
    fn reject_small_data_offset() {
        let mut pkt = make_tcp_syn();
        pkt[12] = 0x40;
        assert!(matches!(
            TcpHeader::parse(&pkt),
            Err(DecodeError::InvalidHeader(_))
        ));
    }
}
