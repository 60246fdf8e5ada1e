//! connscope library crate: offline TCP connection analysis of libpcap
//! captures. The binary and the benchmarks both go through [`analyze`].

pub mod capture;
pub mod config;
pub mod display;
pub mod flow;
pub mod pipeline;
pub mod protocol;
pub mod stats;

#[cfg(test)]
mod testutil;

pub use pipeline::analyze_pipelined;

use capture::{CaptureError, CaptureInfo, CaptureReader, Timestamp, TruncatedRecord};
use config::{Config, DecodeConfig, StatsConfig};
use flow::FlowTracker;
use protocol::{Decoded, DecodeError};
use serde::Serialize;
use std::io::Read;
use stats::StatsReport;

/// What happened to every record read from the capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PacketTally {
    pub records: u64,
    /// Segments handed to the flow tracker.
    pub tcp_segments: u64,
    /// Of `tcp_segments`, those cut by the snaplen and accepted anyway.
    pub snapped_segments: u64,
    pub non_ipv4: u64,
    pub non_tcp: u64,
    /// Non-first IPv4 fragments.
    pub fragments: u64,
    pub undecodable: u64,
    /// Set when the file ended inside a record.
    pub truncated: Option<TruncatedRecord>,
}

impl PacketTally {
    pub fn skipped(&self) -> u64 {
        self.non_ipv4 + self.non_tcp + self.fragments
    }
}

/// Result of one pass over a capture.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub capture: CaptureInfo,
    pub tally: PacketTally,
    pub report: StatsReport,
}

/// One decoded record, or the end of a truncated file.
#[derive(Debug)]
pub(crate) enum Event {
    Packet {
        index: u64,
        timestamp: Timestamp,
        outcome: Result<Decoded, DecodeError>,
    },
    Truncated(TruncatedRecord),
}

/// Read up to `limit` records (0 = all), decode each and pass it to `sink`.
/// Stops early when `sink` returns false. Only format and I/O failures are
/// returned as errors.
pub(crate) fn read_decoded<R, F>(
    reader: &mut CaptureReader<R>,
    decode_config: &DecodeConfig,
    limit: u64,
    mut sink: F,
) -> Result<(), CaptureError>
where
    R: Read,
    F: FnMut(Event) -> bool,
{
    let link = reader.info().link_type;
    let limit = match limit {
        0 => usize::MAX,
        n => usize::try_from(n).unwrap_or(usize::MAX),
    };

    for item in reader.by_ref().take(limit) {
        let event = match item {
            Ok(packet) => Event::Packet {
                index: packet.index,
                timestamp: packet.timestamp,
                outcome: protocol::decode(link, &packet, decode_config),
            },
            Err(CaptureError::TruncatedRecord(truncated)) => Event::Truncated(truncated),
            Err(err) => return Err(err),
        };
        if !sink(event) {
            break;
        }
    }
    Ok(())
}

/// Single owner of the mutable state of one analysis pass.
#[derive(Debug, Default)]
pub(crate) struct Ingest {
    tracker: FlowTracker,
    tally: PacketTally,
    capture_start: Option<Timestamp>,
}

impl Ingest {
    pub(crate) fn new() -> Self {
        Ingest::default()
    }

    pub(crate) fn push(&mut self, event: Event) {
        let (index, timestamp, outcome) = match event {
            Event::Packet {
                index,
                timestamp,
                outcome,
            } => (index, timestamp, outcome),
            Event::Truncated(truncated) => {
                tracing::warn!(
                    record = truncated.record,
                    offset = truncated.offset,
                    expected = truncated.expected,
                    available = truncated.available,
                    "capture ends inside a record, reporting what was read"
                );
                self.tally.truncated = Some(truncated);
                return;
            }
        };

        self.tally.records += 1;
        self.capture_start = Some(match self.capture_start {
            Some(start) => start.min(timestamp),
            None => timestamp,
        });

        match outcome {
            Ok(Decoded::Segment(segment)) => {
                self.tally.tcp_segments += 1;
                if segment.snapped {
                    self.tally.snapped_segments += 1;
                    tracing::trace!(record = index, "segment snapped by capture length");
                }
                self.tracker.observe(&segment);
            }
            Ok(Decoded::NotIpv4 { ether_type }) => {
                self.tally.non_ipv4 += 1;
                tracing::trace!(record = index, ether_type, "not IPv4");
            }
            Ok(Decoded::NotTcp { protocol }) => {
                self.tally.non_tcp += 1;
                tracing::trace!(record = index, protocol, "not TCP");
            }
            Ok(Decoded::Fragment) => {
                self.tally.fragments += 1;
                tracing::trace!(record = index, "non-first fragment");
            }
            Err(err) => {
                self.tally.undecodable += 1;
                tracing::debug!(record = index, error = %err, "dropping undecodable packet");
            }
        }
    }

    pub(crate) fn finish(self, capture: CaptureInfo, config: &StatsConfig) -> Analysis {
        let records = self.tracker.finish();
        let report = stats::summarize(&records, self.capture_start, config);
        tracing::info!(
            records = self.tally.records,
            tcp_segments = self.tally.tcp_segments,
            connections = report.connections.len(),
            undecodable = self.tally.undecodable,
            "analysis complete"
        );
        Analysis {
            capture,
            tally: self.tally,
            report,
        }
    }
}

/// Analyze a capture on the calling thread.
///
/// A file that ends mid-record still yields an `Analysis`; the truncation is
/// recorded in [`PacketTally::truncated`].
pub fn analyze<R: Read>(source: R, config: &Config) -> Result<Analysis, CaptureError> {
    let mut reader = CaptureReader::new(source)?;
    let mut ingest = Ingest::new();
    read_decoded(&mut reader, &config.decode, config.run.count, |event| {
        ingest.push(event);
        true
    })?;
    Ok(ingest.finish(reader.info().clone(), &config.stats))
}
