//! IPv4 header view. Options are skipped via IHL, never interpreted.

use super::{DecodeError, IpProtocol};
use std::fmt;
use std::net::Ipv4Addr;

pub const IPV4_MIN_HEADER_LEN: usize = 20;

#[derive(Debug)]
pub struct Ipv4Header<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    /// Checks the version and that the IHL-implied header was captured.
    /// The total length is checked separately by [`Self::check_total_length`].
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(DecodeError::TooShort {
                layer: "IPv4",
                expected: IPV4_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = data[0] >> 4;
        if version != 4 {
            return Err(DecodeError::InvalidHeader(format!(
                "IP version {} where 4 was expected",
                version
            )));
        }

        let header_len = usize::from(data[0] & 0x0F) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(DecodeError::InvalidHeader(format!(
                "IHL of {} bytes is below the 20-byte minimum",
                header_len
            )));
        }
        if data.len() < header_len {
            return Err(DecodeError::TooShort {
                layer: "IPv4",
                expected: header_len,
                actual: data.len(),
            });
        }

        Ok(Ipv4Header { data, header_len })
    }

    /// The total length must cover the header and fit in `available` bytes:
    /// the captured IP bytes, or the wire length for an accepted snapped record.
    pub fn check_total_length(&self, available: usize) -> Result<(), DecodeError> {
        let total = self.total_length() as usize;
        if total < self.header_len {
            return Err(DecodeError::InvalidHeader(format!(
                "IPv4 total length {} shorter than header length {}",
                total, self.header_len
            )));
        }
        if total > available {
            return Err(DecodeError::InvalidHeader(format!(
                "IPv4 total length {} exceeds {} available bytes",
                total, available
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    #[inline]
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Bytes after the header according to the total length field.
    pub fn payload_len(&self) -> usize {
        (self.total_length() as usize).saturating_sub(self.header_len)
    }

    pub fn more_fragments(&self) -> bool {
        self.data[6] & 0x20 != 0
    }

    /// In 8-byte units.
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.data[6] & 0x1F, self.data[7]])
    }

    /// Any fragment but the first carries no transport header.
    pub fn is_later_fragment(&self) -> bool {
        self.fragment_offset() != 0
    }

    pub fn ttl(&self) -> u8 {
        self.data[8]
    }

    #[inline]
    pub fn protocol_raw(&self) -> u8 {
        self.data[9]
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.protocol_raw())
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }

    /// Captured bytes after the header, cut at the total length so link
    /// padding is never read as payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let captured = self.data.len() - self.header_len;
        let end = self.header_len + self.payload_len().min(captured);
        &self.data[self.header_len..end]
    }
}

impl<'a> fmt::Display for Ipv4Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {} ttl={} len={}",
            self.src_addr(),
            self.dst_addr(),
            self.protocol(),
            self.ttl(),
            self.total_length()
        )?;
        if self.more_fragments() || self.is_later_fragment() {
            write!(f, " frag={}", self.fragment_offset())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20-byte header with total length 40 followed by 20 payload bytes.
    fn datagram() -> Vec<u8> {
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x45;
        pkt[2..4].copy_from_slice(&40u16.to_be_bytes());
        pkt[6] = 0x40; // DF
        pkt[8] = 64;
        pkt[9] = 6;
        pkt[12..16].copy_from_slice(&[192, 168, 1, 100]);
        pkt[16..20].copy_from_slice(&[10, 0, 0, 1]);
        pkt
    }

    #[test]
    fn parse_fields() {
        let pkt = datagram();
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.header_len(), 20);
        assert_eq!(hdr.total_length(), 40);
        assert_eq!(hdr.payload_len(), 20);
        assert_eq!(hdr.protocol(), IpProtocol::Tcp);
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(hdr.dst_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(!hdr.more_fragments());
        assert!(!hdr.is_later_fragment());
        assert_eq!(hdr.to_string(), "192.168.1.100 -> 10.0.0.1 TCP ttl=64 len=40");
        assert!(hdr.check_total_length(pkt.len()).is_ok());
    }

    #[test]
    fn payload_stops_at_total_length() {
        let mut pkt = datagram();
        pkt.extend_from_slice(&[0xAA; 6]);
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.payload().len(), 20);
    }

    #[test]
    fn options_extend_header() {
        let mut pkt = datagram();
        pkt[0] = 0x46;
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.header_len(), 24);
        assert_eq!(hdr.payload().len(), 16);
    }

    #[test]
    fn total_length_is_checked_against_available_bytes() {
        let pkt = datagram();
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert!(matches!(
            hdr.check_total_length(39),
            Err(DecodeError::InvalidHeader(_))
        ));

        let mut short_total = datagram();
        short_total[2..4].copy_from_slice(&12u16.to_be_bytes());
        let hdr = Ipv4Header::parse(&short_total).unwrap();
        assert!(hdr.check_total_length(40).is_err());
    }

    #[test]
    fn later_fragment_is_flagged() {
        let mut pkt = datagram();
        pkt[6] = 0x20;
        pkt[7] = 0xB9;
        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert!(hdr.more_fragments());
        assert!(hdr.is_later_fragment());
        assert_eq!(hdr.fragment_offset(), 185);
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(matches!(
            Ipv4Header::parse(&[0u8; 19]),
            Err(DecodeError::TooShort { .. })
        ));

        let mut v6 = datagram();
        v6[0] = 0x65;
        assert!(matches!(
            Ipv4Header::parse(&v6),
            Err(DecodeError::InvalidHeader(_))
        ));

        let mut small_ihl = datagram();
        small_ihl[0] = 0x44;
        assert!(matches!(
            Ipv4Header::parse(&small_ihl),
            Err(DecodeError::InvalidHeader(_))
        ));

        let mut long_ihl = datagram();
        long_ihl[0] = 0x4F;
        assert!(matches!(
            Ipv4Header::parse(&long_ihl[..40]),
            Err(DecodeError::TooShort { expected: 60, .. })
        ));
    }
}
