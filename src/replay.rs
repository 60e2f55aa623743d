//! # Trace Replay
//!
//! Feeds a recorded sensor trace through the flight computer on the host.
//!
//! A trace is JSON Lines, one object per sample: a `t_ms` field plus any
//! [`SensorFrame`] fields (missing ones default to zero). Blank lines and
//! lines starting with `#` are ignored.
//!
//! ```text
//! {"t_ms": 0, "accel_mps2": [0.0, 0.0, 9.8], "pressure_pa": 101325.0}
//! {"t_ms": 100, "accel_mps2": [0.0, 0.0, 55.0], "raw_accel": [0, 0, 22935]}
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info};

use crate::computer::{FlightComputer, LoopStatus};
use crate::error::{FlightLoggerError, Result};
use crate::hal::{Actuator, Clock, Indicator, SensorFrame, SensorSource};
use crate::telemetry::sink::SinkStats;

/// One line of a trace
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TraceEntry {
    pub t_ms: u64,
    #[serde(flatten)]
    pub frame: SensorFrame,
}

/// Sensor source and clock backed by a parsed trace.
///
/// `read` returns the sample at the cursor and `now_millis` its time; the
/// driver moves the cursor with [`TraceSource::advance`].
#[derive(Debug, Clone, Default)]
pub struct TraceSource {
    entries: Vec<TraceEntry>,
    cursor: usize,
}

impl TraceSource {
    /// Parse trace text.
    ///
    /// # Errors
    ///
    /// Returns `Trace` with the offending line if a line is not a valid entry.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.push(serde_json::from_str::<TraceEntry>(line)?);
        }
        debug!("Parsed {} trace entries", entries.len());
        Ok(Self { entries, cursor: 0 })
    }

    /// Read and parse a trace file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the sample at the cursor.
    pub fn current_time(&self) -> Option<u64> {
        self.entries.get(self.cursor).map(|entry| entry.t_ms)
    }

    /// Step to the next sample, returning its time.
    pub fn advance(&mut self) -> Option<u64> {
        if self.cursor + 1 >= self.entries.len() {
            self.cursor = self.entries.len();
            return None;
        }
        self.cursor += 1;
        self.current_time()
    }
}

impl Clock for TraceSource {
    /// Time of the sample at the cursor, held at the last sample once the
    /// trace is exhausted.
    fn now_millis(&self) -> u64 {
        let last = self.entries.len().saturating_sub(1);
        self.entries
            .get(self.cursor.min(last))
            .map_or(0, |entry| entry.t_ms)
    }
}

impl SensorSource for TraceSource {
    fn begin(&mut self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(FlightLoggerError::Sensor("trace has no samples".into()));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<SensorFrame> {
        self.entries
            .get(self.cursor)
            .map(|entry| entry.frame)
            .ok_or_else(|| FlightLoggerError::Sensor("trace exhausted".into()))
    }
}

/// How a replay ended
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    /// Loop passes after the session start
    pub ticks: usize,
    pub status: LoopStatus,
    pub stats: SinkStats,
}

/// Run a whole trace through `computer`.
///
/// The session starts at the first sample's time, then one tick runs per
/// following sample. With `realtime` set, each tick waits until the
/// sample's offset from the first one has elapsed.
///
/// # Errors
///
/// `Sensor` for an empty trace; fatal sink errors from the final flush.
pub async fn run_replay<A, I>(
    computer: &mut FlightComputer<A, I>,
    trace: &mut TraceSource,
    realtime: bool,
) -> Result<ReplayOutcome>
where
    A: Actuator,
    I: Indicator,
{
    if trace.current_time().is_none() {
        return Err(FlightLoggerError::Sensor("trace has no samples".into()));
    }
    let start_ms = trace.now_millis();
    let started = Instant::now();

    let mut status = computer.start_session(trace, start_ms);
    let mut ticks = 0;

    while !matches!(status, LoopStatus::Halted(_)) {
        if trace.advance().is_none() {
            break;
        }
        let now_ms = trace.now_millis();
        if realtime {
            sleep_until(started + Duration::from_millis(now_ms.saturating_sub(start_ms))).await;
        }
        status = computer.tick(trace, now_ms);
        ticks += 1;
    }

    if !matches!(status, LoopStatus::Halted(_)) {
        computer.finish()?;
    }
    info!("Replay finished after {} ticks: {:?}", ticks, status);

    Ok(ReplayOutcome {
        ticks,
        status,
        stats: computer.sink_stats(),
    })
}
