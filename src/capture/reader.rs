//! Streaming reader for the libpcap file format.
//!
//! File layout:
//!   - Global header (24 bytes): magic, version major/minor, thiszone,
//!     sigfigs, snaplen, link type
//!   - Records: 16-byte header (ts seconds, ts fraction, captured length,
//!     original length) followed by `captured length` bytes
//!
//! The magic number fixes both the byte order of every later header field
//! and whether the timestamp fraction is in microseconds or nanoseconds.

use super::{
    ByteOrder, CaptureError, CaptureInfo, LinkType, RawPacket, Timestamp, TimestampResolution,
    TruncatedRecord,
};
use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

pub const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
pub const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Upper bound on the body buffer reserved up front; larger records grow as
/// bytes actually arrive.
const MAX_PREALLOC: usize = 262_144;

/// Lazy, non-restartable sequence of packet records.
///
/// Yields `Err(CaptureError::TruncatedRecord)` at most once, after which the
/// iterator is exhausted.
#[derive(Debug)]
pub struct CaptureReader<R> {
    source: R,
    info: CaptureInfo,
    offset: u64,
    next_index: u64,
    done: bool,
}

impl<R: Read> CaptureReader<R> {
    /// Read and validate the global header.
    pub fn new(mut source: R) -> Result<Self, CaptureError> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        let got = read_full(&mut source, &mut header)?;
        if got < GLOBAL_HEADER_LEN {
            return Err(CaptureError::Format(format!(
                "global header needs {} bytes, got {}",
                GLOBAL_HEADER_LEN, got
            )));
        }

        let info = parse_global_header(&header)?;
        tracing::info!(
            byte_order = ?info.byte_order,
            resolution = ?info.resolution,
            version = %format!("{}.{}", info.version_major, info.version_minor),
            snaplen = info.snaplen,
            link_type = %info.link_type,
            "capture header accepted"
        );

        Ok(CaptureReader {
            source,
            info,
            offset: GLOBAL_HEADER_LEN as u64,
            next_index: 0,
            done: false,
        })
    }

    pub fn info(&self) -> &CaptureInfo {
        &self.info
    }

    /// Number of complete records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.next_index
    }

    fn read_record(&mut self) -> Result<Option<RawPacket>, CaptureError> {
        let record_offset = self.offset;
        let mut header = [0u8; RECORD_HEADER_LEN];
        let got = read_full(&mut self.source, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < RECORD_HEADER_LEN {
            return Err(CaptureError::TruncatedRecord(TruncatedRecord {
                record: self.next_index,
                offset: record_offset,
                expected: RECORD_HEADER_LEN as u64,
                available: got as u64,
            }));
        }

        let order = self.info.byte_order;
        let ts_sec = order.u32([header[0], header[1], header[2], header[3]]);
        let ts_frac = order.u32([header[4], header[5], header[6], header[7]]);
        let captured_len = order.u32([header[8], header[9], header[10], header[11]]);
        let original_len = order.u32([header[12], header[13], header[14], header[15]]);

        let mut data = Vec::with_capacity((captured_len as usize).min(MAX_PREALLOC));
        let body = (&mut self.source)
            .take(u64::from(captured_len))
            .read_to_end(&mut data)?;
        if body < captured_len as usize {
            return Err(CaptureError::TruncatedRecord(TruncatedRecord {
                record: self.next_index,
                offset: record_offset,
                expected: RECORD_HEADER_LEN as u64 + u64::from(captured_len),
                available: (RECORD_HEADER_LEN + body) as u64,
            }));
        }

        let frac_nanos = match self.info.resolution {
            TimestampResolution::Micro => u64::from(ts_frac) * 1_000,
            TimestampResolution::Nano => u64::from(ts_frac),
        };
        let timestamp = Timestamp::from_nanos(u64::from(ts_sec) * 1_000_000_000 + frac_nanos);

        let packet = RawPacket {
            index: self.next_index,
            timestamp,
            captured_len,
            original_len,
            data,
        };
        self.offset += (RECORD_HEADER_LEN + body) as u64;
        self.next_index += 1;
        Ok(Some(packet))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<RawPacket, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for CaptureReader<R> {}

fn parse_global_header(header: &[u8; GLOBAL_HEADER_LEN]) -> Result<CaptureInfo, CaptureError> {
    let magic = [header[0], header[1], header[2], header[3]];
    let (byte_order, resolution) = match (u32::from_le_bytes(magic), u32::from_be_bytes(magic)) {
        (MAGIC_MICROS, _) => (ByteOrder::Little, TimestampResolution::Micro),
        (MAGIC_NANOS, _) => (ByteOrder::Little, TimestampResolution::Nano),
        (_, MAGIC_MICROS) => (ByteOrder::Big, TimestampResolution::Micro),
        (_, MAGIC_NANOS) => (ByteOrder::Big, TimestampResolution::Nano),
        (_, raw) => {
            return Err(CaptureError::Format(format!(
                "unrecognized magic number 0x{:08x}",
                raw
            )))
        }
    };

    let version_major = byte_order.u16([header[4], header[5]]);
    let version_minor = byte_order.u16([header[6], header[7]]);
    if version_major != 2 || version_minor > 4 {
        return Err(CaptureError::Format(format!(
            "unsupported version {}.{}",
            version_major, version_minor
        )));
    }

    let snaplen = byte_order.u32([header[16], header[17], header[18], header[19]]);
    // Bits 16..32 carry FCS metadata; the link type is the low 16 bits.
    let raw_link = byte_order.u32([header[20], header[21], header[22], header[23]]) & 0xFFFF;
    let link_type = LinkType::from_raw(raw_link).ok_or_else(|| {
        CaptureError::Format(format!("unsupported link type {}", raw_link))
    })?;

    Ok(CaptureInfo {
        byte_order,
        resolution,
        version_major,
        version_minor,
        snaplen,
        link_type,
    })
}

/// Like `read_exact`, but reports how many bytes arrived before EOF.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
