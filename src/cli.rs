use clap::Parser;
use std::path::PathBuf;

/// connscope: reconstruct TCP connections from a pcap capture and report
/// their lifecycle, RTT and traffic statistics
#[derive(Parser, Debug)]
#[command(name = "connscope", version, about)]
pub struct Cli {
    /// Capture file to analyze (libpcap format)
    pub capture: PathBuf,

    /// Path to TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of records to read (0 = whole file)
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Compute aggregate statistics over complete connections only
    #[arg(long)]
    pub complete_only: bool,

    /// Do not unwrap 802.1Q VLAN tags
    #[arg(long)]
    pub no_vlan: bool,

    /// Accept records cut by the capture snaplen, using their wire length
    #[arg(long)]
    pub accept_snapped: bool,

    /// Read and decode on a separate thread
    #[arg(long)]
    pub pipelined: bool,

    /// Capacity of the reader -> tracker channel in pipelined mode
    #[arg(long)]
    pub channel_capacity: Option<usize>,

    /// Export the full analysis as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export per-connection summaries as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Omit the per-connection section of the report
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_path_is_required() {
        assert!(Cli::try_parse_from(["connscope"]).is_err());
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "connscope",
            "trace.pcap",
            "-c",
            "100",
            "--complete-only",
            "--no-vlan",
            "--pipelined",
            "--accept-snapped",
            "--export-csv",
            "out.csv",
            "-q",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.capture, PathBuf::from("trace.pcap"));
        assert_eq!(cli.count, Some(100));
        assert!(cli.complete_only && cli.no_vlan && cli.pipelined && cli.quiet);
        assert!(cli.accept_snapped);
        assert_eq!(cli.export_csv, Some(PathBuf::from("out.csv")));
        assert_eq!(cli.export_json, None);
        assert_eq!(cli.verbose, 2);
    }
}
