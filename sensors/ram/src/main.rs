//! sketchysensor-ram: RAM event provider binary for SketchyBar.
//!
//! Registers a custom bar event, then triggers it with fresh memory readings
//! at the requested cadence until the process is terminated.

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use sketchysensor_core::{parse_seconds, CliDispatcher, ProviderConfig, DEFAULT_BAR_COMMAND};
use sketchysensor_ram::{HostMemorySource, MemoryReader, Reporter};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the RAM provider.
#[derive(Parser)]
#[command(name = "sketchysensor-ram")]
#[command(about = "RAM and swap event provider for SketchyBar")]
#[command(version)]
#[command(author)]
struct Args {
    /// Name of the bar event to register and trigger
    #[arg(required_unless_present = "check", value_parser = validate_event_name)]
    event_name: Option<String>,

    /// Seconds between updates (fractions allowed, e.g. 0.5)
    #[arg(required_unless_present = "check", value_parser = validate_seconds)]
    event_freq: Option<Duration>,

    /// Bar command line client used to deliver events
    #[arg(long, default_value = DEFAULT_BAR_COMMAND)]
    bar: PathBuf,

    /// Seconds to wait for a single delivery before giving up
    #[arg(long, default_value = "5", value_parser = validate_seconds)]
    dispatch_timeout: Duration,

    /// Log filter for diagnostics on stderr (error, warn, info, debug, trace).
    /// `off` also silences the line printed when memory statistics are unreadable
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Check sensor availability and exit
    #[arg(long)]
    check: bool,
}

/// Validate that the event name is not blank.
fn validate_event_name(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("Event name must not be empty".to_owned());
    }
    Ok(s.to_owned())
}

/// Validate a positive number of seconds.
fn validate_seconds(s: &str) -> Result<Duration, String> {
    parse_seconds(s).map_err(|e| e.to_string())
}

fn usage() -> ! {
    let program = std::env::args_os()
        .next()
        .map_or_else(|| "sketchysensor-ram".to_owned(), |p| p.to_string_lossy().into_owned());
    eprintln!("Usage: {program} \"<event-name>\" \"<event_freq>\"");
    process::exit(1);
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
    Ok(())
}

/// Main entry point for the RAM provider.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => usage(),
    };

    init_tracing(&args.log_level)?;

    let mut reader = MemoryReader::new(HostMemorySource::new());

    if args.check {
        match reader.check_availability() {
            Ok(()) => {
                println!("RAM sensor is available");
                println!("{}", serde_json::to_string(&reader.sample())?);
                return Ok(());
            }
            Err(e) => {
                eprintln!("RAM sensor is not available: {e}");
                process::exit(1);
            }
        }
    }

    let (Some(event_name), Some(interval)) = (args.event_name, args.event_freq) else {
        usage();
    };

    let config = ProviderConfig::new(event_name, interval)?
        .with_bar_command(args.bar)
        .with_dispatch_timeout(args.dispatch_timeout);
    let dispatcher = CliDispatcher::from_config(&config);

    match Reporter::new(config, reader, dispatcher).run().await {}
}
