//! Console report for the CLI.
//!
//! Sections follow the classic layout: A) connection count, B) per-connection
//! details, C) classification, D) aggregate statistics.

use crate::stats::{Aggregate, ConnectionSummary};
use crate::{Analysis, PacketTally};
use std::io::{self, Write};

const RULE: &str = "________________________________________________";

/// Print the report to stdout. `quiet` omits section B.
pub fn print_report(analysis: &Analysis, quiet: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, analysis, quiet)?;
    out.flush()
}

pub fn write_report<W: Write>(out: &mut W, analysis: &Analysis, quiet: bool) -> io::Result<()> {
    let capture = &analysis.capture;
    writeln!(
        out,
        "Capture: pcap v{}.{}, {}, {:?} endian, {:?}second timestamps, snaplen {}",
        capture.version_major,
        capture.version_minor,
        capture.link_type,
        capture.byte_order,
        capture.resolution,
        capture.snaplen
    )?;
    write_tally(out, &analysis.tally)?;
    writeln!(out)?;

    let report = &analysis.report;
    writeln!(out, "A) Total number of connections: {}", report.counts.total)?;
    writeln!(out, "{}", RULE)?;

    if !quiet {
        writeln!(out, "\nB) Connection's details\n")?;
        for conn in &report.connections {
            write_connection(out, conn)?;
        }
    }

    let counts = &report.counts;
    writeln!(out, "\nC) General\n")?;
    writeln!(out, "Total number of complete TCP connections: {}", counts.complete)?;
    writeln!(out, "Number of reset TCP connections: {}", counts.reset)?;
    writeln!(
        out,
        "Number of TCP connections that were still open when the trace capture ended: {}",
        counts.open
    )?;
    writeln!(
        out,
        "Number of TCP connections established before the capture started: {}",
        counts.established_before_capture
    )?;
    writeln!(out, "{}", RULE)?;

    let aggregates = &report.aggregates;
    if report.complete_only {
        writeln!(out, "\nD) Complete TCP connections ({})\n", aggregates.connections)?;
    } else {
        writeln!(out, "\nD) All TCP connections ({})\n", aggregates.connections)?;
    }
    write_aggregate(out, "time duration", " seconds", &aggregates.duration_secs, 6)?;
    writeln!(out)?;
    write_aggregate(out, "RTT value", " seconds", &aggregates.rtt_secs, 6)?;
    writeln!(out)?;
    write_aggregate(
        out,
        "number of packets including both directions",
        "",
        &aggregates.packets,
        2,
    )?;
    writeln!(out)?;
    write_aggregate(
        out,
        "receive window size including both directions",
        "",
        &aggregates.window,
        2,
    )?;
    Ok(())
}

fn write_tally<W: Write>(out: &mut W, tally: &PacketTally) -> io::Result<()> {
    writeln!(
        out,
        "Records: {} | TCP segments: {} | skipped: {} (non-IPv4 {}, non-TCP {}, fragments {}) | undecodable: {}",
        tally.records,
        tally.tcp_segments,
        tally.skipped(),
        tally.non_ipv4,
        tally.non_tcp,
        tally.fragments,
        tally.undecodable
    )?;
    if tally.snapped_segments > 0 {
        writeln!(
            out,
            "note: {} segments were cut by the snaplen; their sizes use the wire length",
            tally.snapped_segments
        )?;
    }
    if let Some(truncated) = &tally.truncated {
        writeln!(out, "warning: {}", truncated)?;
    }
    Ok(())
}

fn write_connection<W: Write>(out: &mut W, conn: &ConnectionSummary) -> io::Result<()> {
    writeln!(out, "Connection {}:", conn.index)?;
    writeln!(out, "Source Address: {}", conn.source.ip)?;
    writeln!(out, "Destination Address: {}", conn.destination.ip)?;
    writeln!(out, "Source Port: {}", conn.source.port)?;
    writeln!(out, "Destination Port: {}", conn.destination.port)?;
    writeln!(
        out,
        "Status: {} ({}, {})",
        conn.status, conn.state, conn.termination
    )?;
    if !conn.handshake_observed {
        writeln!(out, "Handshake: not captured")?;
    }
    writeln!(out, "Start time: {:.6} seconds", conn.start_secs)?;
    writeln!(out, "End Time: {:.6} seconds", conn.end_secs)?;
    writeln!(out, "Duration: {:.6} seconds", conn.duration_secs)?;
    match conn.rtt_secs {
        Some(rtt) => writeln!(out, "RTT: {:.6} seconds ({} samples)", rtt, conn.rtt_samples)?,
        None => writeln!(out, "RTT: unavailable")?,
    }
    writeln!(
        out,
        "Number of packets sent from Source to Destination: {}",
        conn.packets_src_to_dst
    )?;
    writeln!(
        out,
        "Number of packets sent from Destination to Source: {}",
        conn.packets_dst_to_src
    )?;
    writeln!(out, "Total number of packets: {}", conn.packets_total)?;
    writeln!(
        out,
        "Number of data bytes sent from Source to Destination: {}",
        conn.bytes_src_to_dst
    )?;
    writeln!(
        out,
        "Number of data bytes sent from Destination to Source: {}",
        conn.bytes_dst_to_src
    )?;
    writeln!(out, "Total number of data bytes: {}", conn.bytes_total)?;
    writeln!(
        out,
        "Receive window: min {} / mean {:.2} / max {}",
        conn.window_min, conn.window_mean, conn.window_max
    )?;
    writeln!(out, "END\n++++++++++++++++++++++++++++++++")
}

fn write_aggregate<W: Write>(
    out: &mut W,
    label: &str,
    unit: &str,
    aggregate: &Aggregate,
    precision: usize,
) -> io::Result<()> {
    match aggregate {
        Aggregate::Defined { min, max, mean } => {
            writeln!(out, "Minimum {}: {:.*}{}", label, precision, min, unit)?;
            writeln!(out, "Mean {}: {:.*}{}", label, precision, mean, unit)?;
            writeln!(out, "Maximum {}: {:.*}{}", label, precision, max, unit)
        }
        Aggregate::Undefined => {
            writeln!(out, "Minimum {}: undefined", label)?;
            writeln!(out, "Mean {}: undefined", label)?;
            writeln!(out, "Maximum {}: undefined", label)
        }
    }
}
