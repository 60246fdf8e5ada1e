mod cli;

use clap::Parser;
use connscope::config::{self, Config};
use connscope::{display, stats};
use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

fn main() {
    let args = cli::Cli::parse();

    // Report goes to stdout, logs to stderr
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&args, &config) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &cli::Cli, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(&args.capture)
        .map_err(|e| format!("cannot open {}: {}", args.capture.display(), e))?;
    let source = BufReader::new(file);

    let started = Instant::now();
    let analysis = if config.run.pipelined {
        connscope::analyze_pipelined(source, config)?
    } else {
        connscope::analyze(source, config)?
    };
    tracing::info!(
        file = %args.capture.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        pipelined = config.run.pipelined,
        "capture processed"
    );

    display::print_report(&analysis, config.output.quiet)?;

    if let Some(path) = &config.output.export_json {
        stats::export_json(path, &analysis)?;
        println!("Summary export (JSON): {}", path.display());
    }
    if let Some(path) = &config.output.export_csv {
        stats::export_csv(path, &analysis.report)?;
        println!("Summary export (CSV):  {}", path.display());
    }

    Ok(())
}

/// File values first, then command-line overrides.
fn load_config(args: &cli::Cli) -> Result<Config, config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(value) = args.count {
        config.run.count = value;
    }
    if let Some(value) = args.channel_capacity {
        config.run.channel_capacity = value;
    }
    if let Some(value) = &args.export_json {
        config.output.export_json = Some(value.clone());
    }
    if let Some(value) = &args.export_csv {
        config.output.export_csv = Some(value.clone());
    }

    if args.pipelined {
        config.run.pipelined = true;
    }
    if args.complete_only {
        config.stats.complete_only = true;
    }
    if args.no_vlan {
        config.decode.vlan = false;
    }
    if args.accept_snapped {
        config.decode.accept_snapped = true;
    }
    if args.quiet {
        config.output.quiet = true;
    }

    Ok(config)
}
