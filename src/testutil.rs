//! Hand-built packet and capture-file fixtures for the unit tests.

use crate::capture::reader::{MAGIC_MICROS, MAGIC_NANOS};
use crate::capture::{RawPacket, Timestamp};
use crate::protocol::tcp::TcpFlags;
use crate::protocol::DecodedSegment;
use std::net::SocketAddrV4;

/// Builder for an Ethernet + IPv4 + TCP frame.
#[derive(Debug, Clone)]
pub struct TcpFrame {
    src: SocketAddrV4,
    dst: SocketAddrV4,
    flags: u8,
    seq: u32,
    ack: u32,
    window: u16,
    payload: usize,
    tcp_options: usize,
    vlan: Option<u16>,
}

impl TcpFrame {
    pub fn new(src: &str, dst: &str) -> Self {
        TcpFrame {
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            flags: 0,
            seq: 0,
            ack: 0,
            window: 65535,
            payload: 0,
            tcp_options: 0,
            vlan: None,
        }
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn ack(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn payload(mut self, len: usize) -> Self {
        self.payload = len;
        self
    }

    /// Option bytes, must be a multiple of 4.
    pub fn tcp_options(mut self, len: usize) -> Self {
        assert_eq!(len % 4, 0);
        self.tcp_options = len;
        self
    }

    pub fn vlan(mut self, id: u16) -> Self {
        self.vlan = Some(id);
        self
    }

    /// IPv4 header, TCP header and payload, without link framing.
    pub fn ipv4_packet(&self) -> Vec<u8> {
        let tcp_len = 20 + self.tcp_options;
        let total = 20 + tcp_len + self.payload;
        let mut pkt = vec![0u8; total];

        let ip = &mut pkt[..20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        ip[4..6].copy_from_slice(&[0x00, 0x01]);
        ip[6] = 0x40; // DF
        ip[8] = 64;
        ip[9] = 6;
        ip[12..16].copy_from_slice(&self.src.ip().octets());
        ip[16..20].copy_from_slice(&self.dst.ip().octets());

        let tcp = &mut pkt[20..20 + tcp_len];
        tcp[0..2].copy_from_slice(&self.src.port().to_be_bytes());
        tcp[2..4].copy_from_slice(&self.dst.port().to_be_bytes());
        tcp[4..8].copy_from_slice(&self.seq.to_be_bytes());
        tcp[8..12].copy_from_slice(&self.ack.to_be_bytes());
        tcp[12] = ((tcp_len / 4) as u8) << 4;
        tcp[13] = self.flags;
        tcp[14..16].copy_from_slice(&self.window.to_be_bytes());
        for byte in tcp[20..].iter_mut() {
            *byte = 0x01; // NOP
        }

        for (i, byte) in pkt[20 + tcp_len..].iter_mut().enumerate() {
            *byte = (i & 0xFF) as u8;
        }
        pkt
    }

    /// Complete Ethernet frame.
    pub fn build(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(18 + 40 + self.payload);
        frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x66]);
        frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        if let Some(id) = self.vlan {
            frame.extend_from_slice(&[0x81, 0x00]);
            frame.extend_from_slice(&(id & 0x0FFF).to_be_bytes());
        }
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&self.ipv4_packet());
        frame
    }

    /// The segment the decoder produces for this frame at `ts`.
    pub fn segment(&self, ts: Timestamp) -> DecodedSegment {
        DecodedSegment {
            timestamp: ts,
            src_ip: *self.src.ip(),
            dst_ip: *self.dst.ip(),
            src_port: self.src.port(),
            dst_port: self.dst.port(),
            flags: TcpFlags::from_bits(self.flags),
            seq: self.seq,
            ack: self.ack,
            window: self.window,
            payload_len: self.payload as u32,
            snapped: false,
        }
    }
}

/// Shorthand for a segment at `micros` microseconds.
pub fn segment(src: &str, dst: &str, flags: u8, micros: u64) -> DecodedSegment {
    TcpFrame::new(src, dst)
        .flags(flags)
        .segment(Timestamp::from_micros(micros))
}

/// A record whose captured and original lengths both equal `data.len()`.
pub fn raw_packet(micros: u64, data: &[u8]) -> RawPacket {
    RawPacket {
        index: 0,
        timestamp: Timestamp::from_micros(micros),
        captured_len: data.len() as u32,
        original_len: data.len() as u32,
        data: data.to_vec(),
    }
}

/// Builder for an in-memory pcap file.
#[derive(Debug, Clone)]
pub struct PcapBuilder {
    big_endian: bool,
    nanos: bool,
    version: (u16, u16),
    link_type: u32,
    records: Vec<(Timestamp, Vec<u8>, u32)>,
}

impl PcapBuilder {
    pub fn new() -> Self {
        PcapBuilder {
            big_endian: false,
            nanos: false,
            version: (2, 4),
            link_type: 1,
            records: Vec::new(),
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn nanos(mut self) -> Self {
        self.nanos = true;
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn link_type(mut self, link_type: u32) -> Self {
        self.link_type = link_type;
        self
    }

    pub fn record(mut self, ts: Timestamp, data: &[u8]) -> Self {
        self.records.push((ts, data.to_vec(), data.len() as u32));
        self
    }

    /// A record cut to `data` by the capture tool's snaplen.
    pub fn record_snapped(mut self, ts: Timestamp, data: &[u8], original_len: u32) -> Self {
        self.records.push((ts, data.to_vec(), original_len));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let magic = if self.nanos { MAGIC_NANOS } else { MAGIC_MICROS };
        self.put_u32(&mut out, magic);
        self.put_u16(&mut out, self.version.0);
        self.put_u16(&mut out, self.version.1);
        self.put_u32(&mut out, 0); // thiszone
        self.put_u32(&mut out, 0); // sigfigs
        self.put_u32(&mut out, 65535);
        self.put_u32(&mut out, self.link_type);

        for (ts, data, original_len) in &self.records {
            let nanos = ts.as_nanos();
            let secs = (nanos / 1_000_000_000) as u32;
            let frac = if self.nanos {
                (nanos % 1_000_000_000) as u32
            } else {
                (nanos % 1_000_000_000 / 1_000) as u32
            };
            self.put_u32(&mut out, secs);
            self.put_u32(&mut out, frac);
            self.put_u32(&mut out, data.len() as u32);
            self.put_u32(&mut out, *original_len);
            out.extend_from_slice(data);
        }
        out
    }

    fn put_u16(&self, out: &mut Vec<u8>, v: u16) {
        if self.big_endian {
            out.extend_from_slice(&v.to_be_bytes());
        } else {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    fn put_u32(&self, out: &mut Vec<u8>, v: u32) {
        if self.big_endian {
            out.extend_from_slice(&v.to_be_bytes());
        } else {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}
