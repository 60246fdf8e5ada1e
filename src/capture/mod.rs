//! Offline capture input.
//!
//! Reads libpcap capture files from any `std::io::Read` source and yields
//! the raw packet records in file order.

pub mod reader;

pub use reader::CaptureReader;

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Capture timestamp in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    nanos: u64,
}

impl Timestamp {
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp { nanos }
    }

    /// Saturates at the largest representable instant.
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp {
            nanos: micros.saturating_mul(1_000),
        }
    }

    #[inline]
    pub fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Seconds since the epoch as a float (lossy for display only).
    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / 1_000_000_000.0
    }

    /// Elapsed time from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}",
            self.nanos / 1_000_000_000,
            self.nanos % 1_000_000_000
        )
    }
}

/// Byte order of the multi-byte header fields, fixed by the magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[inline]
    pub fn u16(&self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    #[inline]
    pub fn u32(&self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// Resolution of the fractional part of record timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampResolution {
    Micro,
    Nano,
}

/// Link-layer header type declared in the global header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// LINKTYPE_ETHERNET (1)
    Ethernet,
    /// LINKTYPE_RAW (101) or LINKTYPE_IPV4 (228): the record starts at the IP header.
    RawIpv4,
}

impl LinkType {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(LinkType::Ethernet),
            101 | 228 => Some(LinkType::RawIpv4),
            _ => None,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Ethernet => write!(f, "Ethernet"),
            LinkType::RawIpv4 => write!(f, "raw IPv4"),
        }
    }
}

/// Validated global header of a capture file.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureInfo {
    pub byte_order: ByteOrder,
    pub resolution: TimestampResolution,
    pub version_major: u16,
    pub version_minor: u16,
    pub snaplen: u32,
    pub link_type: LinkType,
}

/// One packet record as stored in the capture file.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Zero-based position of the record in the file.
    pub index: u64,
    pub timestamp: Timestamp,
    pub captured_len: u32,
    /// Length of the packet on the wire (may exceed `captured_len`).
    pub original_len: u32,
    pub data: Vec<u8>,
}

/// Details of a record cut short by the end of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncatedRecord {
    /// Zero-based index of the incomplete record.
    pub record: u64,
    /// Byte offset of the incomplete record's header in the file.
    pub offset: u64,
    /// Bytes the record declared (header or header + body).
    pub expected: u64,
    /// Bytes actually present.
    pub available: u64,
}

impl fmt::Display for TruncatedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record #{} at offset {} is truncated: declared {} bytes, found {}",
            self.record, self.offset, self.expected, self.available
        )
    }
}

/// Errors from reading a capture file.
#[derive(Debug)]
pub enum CaptureError {
    /// Unrecognized or unsupported global header. Nothing in the file can be trusted.
    Format(String),
    /// The file ends in the middle of a record.
    TruncatedRecord(TruncatedRecord),
    /// Underlying read failure.
    Io(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Format(msg) => write!(f, "capture format error: {}", msg),
            CaptureError::TruncatedRecord(t) => write!(f, "truncated capture: {}", t),
            CaptureError::Io(e) => write!(f, "capture io error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e)
    }
}
