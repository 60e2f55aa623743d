//! # Flight Logger
//!
//! Host driver for the avionics core.
//!
//! - `record <trace>` boots the flight computer against a JSON Lines sensor
//!   trace and writes the binary log configured in `[logging]`.
//! - `decode <log>` turns a retrieved binary log into JSON Lines in physical units.
//!
//! # Examples
//!
//! ```bash
//! flight-logger --config config/default.toml record flight.jsonl --realtime
//! flight-logger decode data.log --snapshots -o data.jsonl
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use flight_logger::computer::{boot, LoopStatus};
use flight_logger::config::{Config, DiagnosticsConfig};
use flight_logger::error::HaltReason;
use flight_logger::hal::host::{LoggedServo, TracingIndicator};
use flight_logger::hal::Indicator;
use flight_logger::replay::{run_replay, TraceSource};
use flight_logger::telemetry::channel::ChannelRegistry;
use flight_logger::telemetry::reader::decode_stream;

/// Period of the halt indicator pattern (400 ms on, 400 ms off)
const HALT_PULSE_PERIOD_MS: u64 = 800;

#[derive(Parser, Debug)]
#[command(name = "flight-logger", version)]
#[command(about = "Launch detection, recovery deployment and delta-encoded flight logging")]
struct Cli {
    /// Configuration file; built-in defaults are used if it does not exist
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a sensor trace through the flight computer
    Record {
        /// JSON Lines sensor trace
        trace: PathBuf,

        /// Pace samples at their recorded times
        #[arg(long)]
        realtime: bool,

        /// Erase the log file if it cannot be opened
        #[arg(long)]
        erase: bool,
    },
    /// Decode a binary flight log to JSON Lines
    Decode {
        /// Binary log file
        log: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// One row per timestamp with the latest value of every channel
        #[arg(long)]
        snapshots: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        Config::default()
    };

    let _guard = init_tracing(&config.diagnostics);
    info!("Flight Logger v{} starting...", env!("CARGO_PKG_VERSION"));
    if !cli.config.exists() {
        warn!("{} not found, using defaults", cli.config.display());
    }

    match cli.command {
        Command::Record { trace, realtime, erase } => {
            record(&config, &trace, realtime || config.replay.realtime, erase).await
        }
        Command::Decode { log, output, snapshots } => decode(&log, output.as_deref(), snapshots),
    }
}

/// Install the console subscriber and, if enabled, a daily-rolling file layer.
///
/// The returned guard must live until exit so buffered file output is written.
fn init_tracing(diagnostics: &DiagnosticsConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&diagnostics.level));

    let (file_layer, guard) = if diagnostics.file_logging {
        let appender = tracing_appender::rolling::daily(&diagnostics.log_dir, "flight-logger.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn record(config: &Config, trace_path: &Path, realtime: bool, erase: bool) -> Result<()> {
    let started = Instant::now();
    let mut trace = TraceSource::load(trace_path)
        .with_context(|| format!("loading trace {}", trace_path.display()))?;
    info!("Loaded {} samples from {}", trace.len(), trace_path.display());

    let mut computer = match boot(config, &mut trace, LoggedServo::new(), TracingIndicator::new(), erase) {
        Ok(computer) => computer,
        Err(reason) => {
            let mut indicator = TracingIndicator::new();
            return halt_pattern(&reason, || indicator.fault_pulse(), tokio::signal::ctrl_c()).await;
        }
    };

    let outcome = tokio::select! {
        outcome = run_replay(&mut computer, &mut trace, realtime) => Some(outcome?),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(outcome) = outcome else {
        info!("Received Ctrl+C, flushing log...");
        computer.finish()?;
        return Ok(());
    };

    info!(
        "{} ticks in {} ms, {} records, {} bytes written, {} rollbacks, deployed: {}",
        outcome.ticks,
        started.elapsed().as_millis(),
        outcome.stats.records,
        outcome.stats.bytes_written,
        outcome.stats.rollbacks,
        computer.recovery().has_deployed()
    );

    match outcome.status {
        LoopStatus::Halted(reason) => {
            halt_pattern(&reason, || computer.pulse_fault(), tokio::signal::ctrl_c()).await
        }
        status => {
            info!("Final state: {:?}", status);
            Ok(())
        }
    }
}

/// Repeat the fault indicator until `shutdown` resolves, as the board does
/// until power-off.
async fn halt_pattern<F, S>(reason: &HaltReason, mut pulse: F, shutdown: S) -> Result<()>
where
    F: FnMut(),
    S: Future,
{
    error!("Halted: {}", reason);
    info!("Press Ctrl+C to exit");

    tokio::pin!(shutdown);
    let mut ticker = interval(Duration::from_millis(HALT_PULSE_PERIOD_MS));
    loop {
        tokio::select! {
            _ = ticker.tick() => pulse(),
            _ = &mut shutdown => break,
        }
    }

    if reason.is_failure() {
        Err(anyhow!("{}", reason))
    } else {
        Ok(())
    }
}

fn decode(log: &Path, output: Option<&Path>, snapshots: bool) -> Result<()> {
    let bytes = std::fs::read(log).with_context(|| format!("reading {}", log.display()))?;
    let decoded = decode_stream(&bytes, &ChannelRegistry::standard())?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if snapshots {
        decoded.write_snapshots_jsonl(writer)?;
    } else {
        decoded.write_samples_jsonl(writer)?;
    }

    info!(
        "Decoded {} samples over {} ticks ({} truncated bytes, {} untimed records)",
        decoded.samples.len(),
        decoded.ticks,
        decoded.truncated_bytes,
        decoded.untimed_records
    );
    Ok(())
}
