//! Per-connection summaries and cross-connection aggregates.

use crate::capture::Timestamp;
use crate::config::StatsConfig;
use crate::flow::{ConnectionRecord, ConnectionState, Endpoint, Termination};
use crate::Analysis;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// min/max/mean over a set of values, or nothing when the set is empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregate {
    Undefined,
    Defined { min: f64, max: f64, mean: f64 },
}

impl Aggregate {
    pub fn is_defined(&self) -> bool {
        matches!(self, Aggregate::Defined { .. })
    }
}

/// Running min/max/mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricAccumulator {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        MetricAccumulator::default()
    }

    pub fn push(&mut self, value: f64) {
        self.push_range(value, value, value);
    }

    /// Fold in a value that already carries its own extremes.
    pub fn push_range(&mut self, min: f64, max: f64, mean: f64) {
        if self.count == 0 {
            self.min = min;
            self.max = max;
        } else {
            self.min = self.min.min(min);
            self.max = self.max.max(max);
        }
        self.sum += mean;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self) -> Aggregate {
        if self.count == 0 {
            return Aggregate::Undefined;
        }
        // Float summation can land a hair outside the extremes.
        let mean = (self.sum / self.count as f64).clamp(self.min, self.max);
        Aggregate::Defined {
            min: self.min,
            max: self.max,
            mean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Connections the aggregates were computed over.
    pub connections: usize,
    pub rtt_secs: Aggregate,
    pub packets: Aggregate,
    pub duration_secs: Aggregate,
    pub window: Aggregate,
}

/// Connection classification, first matching rule wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionCounts {
    pub total: usize,
    /// Any RST seen.
    pub reset: usize,
    /// First segment carried no SYN.
    pub established_before_capture: usize,
    /// At least one SYN and one FIN.
    pub complete: usize,
    /// SYN seen, no FIN.
    pub open: usize,
}

impl ConnectionCounts {
    fn count(&mut self, record: &ConnectionRecord) {
        self.total += 1;
        if record.reset {
            self.reset += 1;
        } else if !record.handshake_observed {
            self.established_before_capture += 1;
        } else if record.syn_count >= 1 && record.fin_count >= 1 {
            self.complete += 1;
        } else {
            self.open += 1;
        }
    }
}

/// One connection, presented from the initiator's side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSummary {
    /// 1-based position in first-seen order.
    pub index: usize,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub state: ConnectionState,
    pub termination: Termination,
    pub handshake_observed: bool,
    pub complete: bool,
    pub status: String,
    /// Seconds from the first packet of the capture.
    pub start_secs: f64,
    pub end_secs: f64,
    pub duration_secs: f64,
    pub packets_src_to_dst: u64,
    pub packets_dst_to_src: u64,
    pub packets_total: u64,
    pub bytes_src_to_dst: u64,
    pub bytes_dst_to_src: u64,
    pub bytes_total: u64,
    /// Mean handshake RTT, `None` when no sample was taken.
    pub rtt_secs: Option<f64>,
    pub rtt_samples: usize,
    pub window_min: u16,
    pub window_max: u16,
    pub window_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub connections: Vec<ConnectionSummary>,
    pub aggregates: AggregateStats,
    pub counts: ConnectionCounts,
    /// Aggregates cover complete connections only.
    pub complete_only: bool,
}

fn mean_rtt(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: u128 = samples.iter().map(Duration::as_nanos).sum();
    let mean = total / samples.len() as u128;
    Some(Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
}

fn summarize_record(index: usize, record: &ConnectionRecord, origin: Timestamp) -> ConnectionSummary {
    let forward = record.initiator;
    let reverse = forward.reverse();
    let (source, destination) = record.key.endpoints(forward);
    ConnectionSummary {
        index,
        source,
        destination,
        state: record.state,
        termination: record
            .termination()
            .unwrap_or(Termination::OpenAtCaptureEnd),
        handshake_observed: record.handshake_observed,
        complete: record.is_complete(),
        status: record.status_code(),
        start_secs: record.first_seen.saturating_duration_since(origin).as_secs_f64(),
        end_secs: record.last_seen.saturating_duration_since(origin).as_secs_f64(),
        duration_secs: record.duration().as_secs_f64(),
        packets_src_to_dst: record.packets_from(forward),
        packets_dst_to_src: record.packets_from(reverse),
        packets_total: record.total_packets(),
        bytes_src_to_dst: record.bytes_from(forward),
        bytes_dst_to_src: record.bytes_from(reverse),
        bytes_total: record.total_bytes(),
        rtt_secs: mean_rtt(&record.rtt_samples).map(|rtt| rtt.as_secs_f64()),
        rtt_samples: record.rtt_samples.len(),
        window_min: record.window_min,
        window_max: record.window_max,
        window_mean: record.window_mean(),
    }
}

/// Derive the report for `records` (first-seen order).
///
/// `capture_start` anchors the relative start/end offsets; without it the
/// earliest record start is used.
pub fn summarize(
    records: &[ConnectionRecord],
    capture_start: Option<Timestamp>,
    config: &StatsConfig,
) -> StatsReport {
    let origin = capture_start
        .or_else(|| records.iter().map(|r| r.first_seen).min())
        .unwrap_or_default();

    let mut counts = ConnectionCounts::default();
    let mut rtt = MetricAccumulator::new();
    let mut packets = MetricAccumulator::new();
    let mut duration = MetricAccumulator::new();
    let mut window = MetricAccumulator::new();
    let mut in_scope = 0usize;

    let connections: Vec<ConnectionSummary> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            counts.count(record);
            let summary = summarize_record(i + 1, record, origin);
            if !config.complete_only || summary.complete {
                in_scope += 1;
                if let Some(value) = summary.rtt_secs {
                    rtt.push(value);
                }
                packets.push(summary.packets_total as f64);
                duration.push(summary.duration_secs);
                window.push_range(
                    f64::from(summary.window_min),
                    f64::from(summary.window_max),
                    summary.window_mean,
                );
            }
            summary
        })
        .collect();

    StatsReport {
        connections,
        aggregates: AggregateStats {
            connections: in_scope,
            rtt_secs: rtt.finish(),
            packets: packets.finish(),
            duration_secs: duration.finish(),
            window: window.finish(),
        },
        counts,
        complete_only: config.complete_only,
    }
}

pub fn write_summary_json<W: Write>(writer: W, analysis: &Analysis) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, analysis)
}

pub fn write_summary_csv<W: Write>(mut writer: W, report: &StatsReport) -> std::io::Result<()> {
    writeln!(
        writer,
        "index,source_ip,source_port,destination_ip,destination_port,state,termination,status,handshake_observed,start_secs,end_secs,duration_secs,packets_src_to_dst,packets_dst_to_src,packets_total,bytes_src_to_dst,bytes_dst_to_src,bytes_total,rtt_secs,rtt_samples,window_min,window_max,window_mean"
    )?;
    for conn in &report.connections {
        let rtt = conn
            .rtt_secs
            .map(|value| format!("{:.6}", value))
            .unwrap_or_default();
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{},{},{},{},{},{},{},{},{},{},{:.1}",
            conn.index,
            conn.source.ip,
            conn.source.port,
            conn.destination.ip,
            conn.destination.port,
            conn.state,
            csv_escape(&conn.termination.to_string()),
            csv_escape(&conn.status),
            conn.handshake_observed,
            conn.start_secs,
            conn.end_secs,
            conn.duration_secs,
            conn.packets_src_to_dst,
            conn.packets_dst_to_src,
            conn.packets_total,
            conn.bytes_src_to_dst,
            conn.bytes_dst_to_src,
            conn.bytes_total,
            rtt,
            conn.rtt_samples,
            conn.window_min,
            conn.window_max,
            conn.window_mean,
        )?;
    }
    writer.flush()
}

pub fn export_json(path: &Path, analysis: &Analysis) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    write_summary_json(BufWriter::new(file), analysis)?;
    Ok(())
}

pub fn export_csv(path: &Path, report: &StatsReport) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    write_summary_csv(BufWriter::new(file), report)?;
    Ok(())
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        let escaped = field.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        field.to_string()
    }
}
