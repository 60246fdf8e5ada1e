//! TCP connection reconstruction.
//!
//! Segments are grouped by a direction-independent [`FlowKey`] into
//! [`ConnectionRecord`]s kept in first-seen order. Lifecycle is inferred from
//! control flags only: there is no live socket to ask.

use crate::capture::Timestamp;
use crate::protocol::tcp::TcpFlags;
use crate::protocol::DecodedSegment;
use ahash::AHashMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    AtoB,
    BtoA,
}

impl FlowDirection {
    pub fn reverse(self) -> Self {
        match self {
            FlowDirection::AtoB => FlowDirection::BtoA,
            FlowDirection::BtoA => FlowDirection::AtoB,
        }
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDirection::AtoB => write!(f, "a_to_b"),
            FlowDirection::BtoA => write!(f, "b_to_a"),
        }
    }
}

/// Unordered endpoint pair. `a` is always the lower endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl FlowKey {
    /// Normalize a (src, dst) pair. The direction tells which way the
    /// segment travelled relative to the stored order.
    pub fn new(src: Endpoint, dst: Endpoint) -> (Self, FlowDirection) {
        if src <= dst {
            (FlowKey { a: src, b: dst }, FlowDirection::AtoB)
        } else {
            (FlowKey { a: dst, b: src }, FlowDirection::BtoA)
        }
    }

    /// (sender, receiver) for a direction.
    pub fn endpoints(&self, direction: FlowDirection) -> (Endpoint, Endpoint) {
        match direction {
            FlowDirection::AtoB => (self.a, self.b),
            FlowDirection::BtoA => (self.b, self.a),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp {} <-> {}", self.a, self.b)
    }
}

/// The single lifecycle-relevant meaning of a segment, by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    Rst,
    Fin,
    /// ACK without SYN.
    Ack,
    Syn,
    Other,
}

impl SegmentEvent {
    pub fn from_flags(flags: TcpFlags) -> Self {
        if flags.rst {
            SegmentEvent::Rst
        } else if flags.fin {
            SegmentEvent::Fin
        } else if flags.ack && !flags.syn {
            SegmentEvent::Ack
        } else if flags.syn {
            SegmentEvent::Syn
        } else {
            SegmentEvent::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Established,
    Closing { first_fin: FlowDirection },
    Closed,
}

impl ConnectionState {
    /// Transition on one segment event sent in `direction`.
    pub fn next(self, event: SegmentEvent, direction: FlowDirection) -> Self {
        use ConnectionState::*;
        match (self, event) {
            (Closed, _) => Closed,
            (_, SegmentEvent::Rst) => Closed,
            (Opening | Established, SegmentEvent::Fin) => Closing {
                first_fin: direction,
            },
            (Closing { first_fin }, SegmentEvent::Fin) if first_fin != direction => Closed,
            (Opening, SegmentEvent::Ack) => Established,
            (state, _) => state,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Opening => write!(f, "opening"),
            ConnectionState::Established => write!(f, "established"),
            ConnectionState::Closing { .. } => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a connection ended, as far as the capture shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// FIN from both sides.
    Finished,
    Reset,
    OpenAtCaptureEnd,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Finished => write!(f, "finished"),
            Termination::Reset => write!(f, "reset"),
            Termination::OpenAtCaptureEnd => write!(f, "open at capture end"),
        }
    }
}

/// An outstanding SYN waiting for the peer to acknowledge `seq + 1`.
#[derive(Debug, Clone, Copy)]
struct HandshakeProbe {
    sender: FlowDirection,
    expected_ack: u32,
    sent_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub key: FlowKey,
    /// Side that opened the connection (or sent first, if the open was missed).
    pub initiator: FlowDirection,
    pub state: ConnectionState,
    /// False when the capture joined mid-connection.
    pub handshake_observed: bool,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub packets_a_to_b: u64,
    pub packets_b_to_a: u64,
    /// TCP payload bytes.
    pub bytes_a_to_b: u64,
    pub bytes_b_to_a: u64,
    pub window_min: u16,
    pub window_max: u16,
    pub syn_count: u32,
    pub fin_count: u32,
    /// Any RST seen, even after the connection closed.
    pub reset: bool,
    pub rtt_samples: Vec<Duration>,
    window_sum: u64,
    termination: Option<Termination>,
    probe: Option<HandshakeProbe>,
}

impl ConnectionRecord {
    fn new(key: FlowKey, direction: FlowDirection, segment: &DecodedSegment) -> Self {
        let flags = segment.flags;
        let initiator = if flags.syn && flags.ack {
            direction.reverse()
        } else {
            direction
        };
        ConnectionRecord {
            key,
            initiator,
            state: if flags.syn {
                ConnectionState::Opening
            } else {
                ConnectionState::Established
            },
            handshake_observed: flags.syn,
            first_seen: segment.timestamp,
            last_seen: segment.timestamp,
            packets_a_to_b: 0,
            packets_b_to_a: 0,
            bytes_a_to_b: 0,
            bytes_b_to_a: 0,
            window_min: u16::MAX,
            window_max: 0,
            syn_count: 0,
            fin_count: 0,
            reset: false,
            rtt_samples: Vec::new(),
            window_sum: 0,
            termination: None,
            probe: None,
        }
    }

    fn observe(&mut self, direction: FlowDirection, segment: &DecodedSegment) {
        let ts = segment.timestamp;
        self.first_seen = self.first_seen.min(ts);
        self.last_seen = self.last_seen.max(ts);

        let payload = u64::from(segment.payload_len);
        match direction {
            FlowDirection::AtoB => {
                self.packets_a_to_b += 1;
                self.bytes_a_to_b += payload;
            }
            FlowDirection::BtoA => {
                self.packets_b_to_a += 1;
                self.bytes_b_to_a += payload;
            }
        }

        self.window_min = self.window_min.min(segment.window);
        self.window_max = self.window_max.max(segment.window);
        self.window_sum += u64::from(segment.window);

        let flags = segment.flags;
        if flags.syn {
            self.syn_count += 1;
        }
        if flags.fin {
            self.fin_count += 1;
        }
        if flags.rst {
            self.reset = true;
        }

        self.sample_rtt(direction, segment);

        let event = SegmentEvent::from_flags(flags);
        let next = self.state.next(event, direction);
        if next != self.state {
            tracing::trace!(flow = %self.key, from = %self.state, to = %next, "state change");
            if next.is_closed() {
                self.termination = Some(if event == SegmentEvent::Rst {
                    Termination::Reset
                } else {
                    Termination::Finished
                });
            }
            self.state = next;
        }
    }

    fn sample_rtt(&mut self, direction: FlowDirection, segment: &DecodedSegment) {
        if let Some(probe) = self.probe {
            if direction != probe.sender && segment.flags.ack && segment.ack == probe.expected_ack
            {
                let rtt = segment.timestamp.saturating_duration_since(probe.sent_at);
                self.rtt_samples.push(rtt);
                self.probe = None;
            }
        }
        // A retransmitted SYN restarts the measurement.
        if segment.flags.is_pure_syn() {
            self.probe = Some(HandshakeProbe {
                sender: direction,
                expected_ack: segment.seq.wrapping_add(1),
                sent_at: segment.timestamp,
            });
        }
    }

    pub fn packets_from(&self, direction: FlowDirection) -> u64 {
        match direction {
            FlowDirection::AtoB => self.packets_a_to_b,
            FlowDirection::BtoA => self.packets_b_to_a,
        }
    }

    pub fn bytes_from(&self, direction: FlowDirection) -> u64 {
        match direction {
            FlowDirection::AtoB => self.bytes_a_to_b,
            FlowDirection::BtoA => self.bytes_b_to_a,
        }
    }

    pub fn total_packets(&self) -> u64 {
        self.packets_a_to_b + self.packets_b_to_a
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_a_to_b + self.bytes_b_to_a
    }

    /// Zero when only one packet was seen.
    pub fn duration(&self) -> Duration {
        self.last_seen.saturating_duration_since(self.first_seen)
    }

    pub fn window_mean(&self) -> f64 {
        match self.total_packets() {
            0 => 0.0,
            n => self.window_sum as f64 / n as f64,
        }
    }

    /// `None` until the connection closes or the tracker is finished.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// At least one SYN and one FIN, never reset.
    pub fn is_complete(&self) -> bool {
        self.syn_count >= 1 && self.fin_count >= 1 && !self.reset
    }

    /// `R` for reset connections, otherwise `S<syns>F<fins>`.
    pub fn status_code(&self) -> String {
        if self.reset {
            "R".to_string()
        } else {
            format!("S{}F{}", self.syn_count, self.fin_count)
        }
    }
}

/// Owns every connection seen in one pass over a capture.
#[derive(Debug, Default)]
pub struct FlowTracker {
    index: AHashMap<FlowKey, usize>,
    records: Vec<ConnectionRecord>,
}

impl FlowTracker {
    pub fn new() -> Self {
        FlowTracker::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Feed one segment. Must be called in capture order.
    pub fn observe(&mut self, segment: &DecodedSegment) {
        let src = Endpoint {
            ip: segment.src_ip,
            port: segment.src_port,
        };
        let dst = Endpoint {
            ip: segment.dst_ip,
            port: segment.dst_port,
        };
        let (key, direction) = FlowKey::new(src, dst);

        match self.index.get(&key) {
            Some(&pos) => self.records[pos].observe(direction, segment),
            None => {
                tracing::debug!(flow = %key, flags = %segment.flags, "new connection");
                let mut record = ConnectionRecord::new(key, direction, segment);
                record.observe(direction, segment);
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, key: &FlowKey) -> Option<&ConnectionRecord> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    /// Connections in first-seen order.
    pub fn records(&self) -> &[ConnectionRecord] {
        &self.records
    }

    /// End of input: anything not closed stays open at capture end.
    pub fn finish(mut self) -> Vec<ConnectionRecord> {
        let mut open = 0usize;
        for record in &mut self.records {
            if record.termination.is_none() {
                record.termination = Some(Termination::OpenAtCaptureEnd);
                open += 1;
            }
        }
        tracing::debug!(
            connections = self.records.len(),
            open,
            "flow tracking finished"
        );
        self.records
    }
}
