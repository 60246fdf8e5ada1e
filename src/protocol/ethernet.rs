//! Ethernet II framing, with optional 802.1Q tag unwrapping.

use super::{DecodeError, EtherType};
use std::fmt;

pub const ETH_HEADER_LEN: usize = 14;
pub const VLAN_TAG_LEN: usize = 4;

/// Borrowed view of an Ethernet frame.
#[derive(Debug)]
pub struct EthernetFrame<'a> {
    data: &'a [u8],
    ether_type: EtherType,
    vlan_id: Option<u16>,
    payload_offset: usize,
}

impl<'a> EthernetFrame<'a> {
    /// Parse the link header. With `unwrap_vlan`, a single 802.1Q tag is
    /// skipped and [`ether_type`](Self::ether_type) reports the inner type.
    pub fn parse(data: &'a [u8], unwrap_vlan: bool) -> Result<Self, DecodeError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(DecodeError::TooShort {
                layer: "Ethernet",
                expected: ETH_HEADER_LEN,
                actual: data.len(),
            });
        }

        let outer = EtherType::from(u16::from_be_bytes([data[12], data[13]]));
        if outer != EtherType::VlanTagged || !unwrap_vlan {
            return Ok(EthernetFrame {
                data,
                ether_type: outer,
                vlan_id: None,
                payload_offset: ETH_HEADER_LEN,
            });
        }

        let tagged_len = ETH_HEADER_LEN + VLAN_TAG_LEN;
        if data.len() < tagged_len {
            return Err(DecodeError::TooShort {
                layer: "802.1Q",
                expected: tagged_len,
                actual: data.len(),
            });
        }
        let tci = u16::from_be_bytes([data[14], data[15]]);
        Ok(EthernetFrame {
            data,
            ether_type: EtherType::from(u16::from_be_bytes([data[16], data[17]])),
            vlan_id: Some(tci & 0x0FFF),
            payload_offset: tagged_len,
        })
    }

    pub fn src_mac(&self) -> &'a [u8] {
        &self.data[6..12]
    }

    pub fn dst_mac(&self) -> &'a [u8] {
        &self.data[0..6]
    }

    /// Type of the payload, after any unwrapped tag.
    #[inline]
    pub fn ether_type(&self) -> EtherType {
        self.ether_type
    }

    pub fn vlan_id(&self) -> Option<u16> {
        self.vlan_id
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.payload_offset..]
    }
}

fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

impl<'a> fmt::Display for EthernetFrame<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {}",
            format_mac(self.src_mac()),
            format_mac(self.dst_mac()),
            self.ether_type
        )?;
        if let Some(id) = self.vlan_id {
            write!(f, " vlan={}", id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ether_type: [u8; 2], rest: &[u8]) -> Vec<u8> {
        let mut data = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x66];
        data.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        data.extend_from_slice(&ether_type);
        data.extend_from_slice(rest);
        data
    }

    #[test]
    fn untagged_frame() {
        let data = frame([0x08, 0x00], &[0xAB; 4]);
        let eth = EthernetFrame::parse(&data, true).unwrap();
        assert_eq!(eth.ether_type(), EtherType::Ipv4);
        assert_eq!(eth.vlan_id(), None);
        assert_eq!(eth.payload(), &[0xAB; 4]);
        assert_eq!(
            eth.to_string(),
            "00:11:22:33:44:55 -> 00:11:22:33:44:66 IPv4"
        );
    }

    #[test]
    fn vlan_tag_is_skipped_when_enabled() {
        let data = frame([0x81, 0x00], &[0x20, 0x2A, 0x08, 0x00, 0xCD]);
        let eth = EthernetFrame::parse(&data, true).unwrap();
        assert_eq!(eth.ether_type(), EtherType::Ipv4);
        assert_eq!(eth.vlan_id(), Some(42));
        assert_eq!(eth.payload(), &[0xCD]);
        assert!(eth.to_string().ends_with("IPv4 vlan=42"));
    }

    #[test]
    fn vlan_tag_is_kept_when_disabled() {
        let data = frame([0x81, 0x00], &[0x00, 0x2A, 0x08, 0x00]);
        let eth = EthernetFrame::parse(&data, false).unwrap();
        assert_eq!(eth.ether_type(), EtherType::VlanTagged);
        assert_eq!(eth.payload().len(), 4);
    }

    #[test]
    fn short_frames_are_rejected() {
        assert_eq!(
            EthernetFrame::parse(&[0u8; 13], true).unwrap_err(),
            DecodeError::TooShort {
                layer: "Ethernet",
                expected: 14,
                actual: 13
            }
        );
        let cut_tag = frame([0x81, 0x00], &[0x00]);
        assert!(matches!(
            EthernetFrame::parse(&cut_tag, true),
            Err(DecodeError::TooShort { layer: "802.1Q", .. })
        ));
    }
}
