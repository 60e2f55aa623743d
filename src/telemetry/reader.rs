//! # Log Reader
//!
//! Host-side decoding of a retrieved log stream.
//!
//! This module handles:
//! - Walking the record stream and discarding a truncated trailing record
//! - Attaching each timestamp record's time to the value records before it
//! - Converting raw values to physical units through the channel table
//! - JSON Lines export, either one line per sample or one fill-forward row per timestamp

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, warn};

use super::channel::ChannelRegistry;
use super::record::LogRecord;
use crate::error::{FlightLoggerError, Result};

/// One timestamped channel value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp_ms: u32,
    pub channel: u8,
    pub name: String,
    pub raw: i32,
    /// Raw value in physical units
    pub value: f64,
    pub unit: String,
}

/// Last known value of every channel at one timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub timestamp_ms: u32,
    pub values: BTreeMap<String, f64>,
}

/// Result of decoding a whole stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLog {
    pub samples: Vec<Sample>,
    /// Timestamp records seen
    pub ticks: usize,
    /// Bytes of an incomplete record at the end of the stream
    pub truncated_bytes: usize,
    /// Value records with no timestamp record after them
    pub untimed_records: usize,
}

impl DecodedLog {
    /// Fill-forward table: for each distinct timestamp, the latest value of
    /// every channel seen so far.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Snapshot> {
        let mut current = BTreeMap::new();
        let mut rows: Vec<Snapshot> = Vec::new();

        for sample in &self.samples {
            current.insert(sample.name.clone(), sample.value);
            match rows.last_mut() {
                Some(row) if row.timestamp_ms == sample.timestamp_ms => {
                    row.values = current.clone();
                }
                _ => rows.push(Snapshot {
                    timestamp_ms: sample.timestamp_ms,
                    values: current.clone(),
                }),
            }
        }
        rows
    }

    /// Write one JSON object per sample.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failure on `out`.
    pub fn write_samples_jsonl<W: Write>(&self, mut out: W) -> Result<()> {
        for sample in &self.samples {
            serde_json::to_writer(&mut out, sample)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write one JSON object per fill-forward snapshot.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failure on `out`.
    pub fn write_snapshots_jsonl<W: Write>(&self, mut out: W) -> Result<()> {
        for row in self.snapshots() {
            serde_json::to_writer(&mut out, &row)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Decode a complete log stream.
///
/// # Arguments
///
/// * `bytes` - The raw log file contents
/// * `registry` - Channel table for names and physical scales
///
/// # Errors
///
/// Returns `MalformedRecord` with the stream offset if a byte sequence is
/// neither a value record nor a timestamp record.
///
/// # Examples
///
/// ```
/// use flight_logger::telemetry::channel::ChannelRegistry;
/// use flight_logger::telemetry::reader::decode_stream;
/// use flight_logger::telemetry::record::LogRecord;
///
/// let mut bytes = LogRecord::value(5, 417).unwrap().to_bytes();
/// bytes.extend(LogRecord::timestamp(1, 250).unwrap().to_bytes());
///
/// let log = decode_stream(&bytes, &ChannelRegistry::standard()).unwrap();
/// assert_eq!(log.samples.len(), 1);
/// assert_eq!(log.samples[0].timestamp_ms, 250);
/// assert!((log.samples[0].value - 1.0).abs() < 1e-9);
/// ```
pub fn decode_stream(bytes: &[u8], registry: &ChannelRegistry) -> Result<DecodedLog> {
    let mut log = DecodedLog::default();
    let mut pending: Vec<(u8, i32)> = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let decoded = LogRecord::decode(&bytes[offset..]).map_err(|e| match e {
            FlightLoggerError::MalformedRecord { byte, .. } => {
                FlightLoggerError::MalformedRecord { offset, byte }
            }
            other => other,
        })?;

        let Some((record, used)) = decoded else {
            log.truncated_bytes = bytes.len() - offset;
            warn!("Discarding {} trailing bytes of a truncated record", log.truncated_bytes);
            break;
        };
        offset += used;

        match record {
            LogRecord::Value { channel, value } => pending.push((channel, value)),
            LogRecord::Timestamp { count, timestamp_ms } => {
                if usize::from(count) != pending.len() {
                    warn!(
                        "Timestamp at {} ms counts {} records, found {}",
                        timestamp_ms,
                        count,
                        pending.len()
                    );
                }
                log.ticks += 1;
                for (channel, raw) in pending.drain(..) {
                    log.samples.push(to_sample(registry, channel, raw, timestamp_ms));
                }
            }
        }
    }

    if !pending.is_empty() {
        warn!("{} value records have no timestamp", pending.len());
        log.untimed_records = pending.len();
    }
    debug!("Decoded {} samples over {} ticks", log.samples.len(), log.ticks);
    Ok(log)
}

fn to_sample(registry: &ChannelRegistry, channel: u8, raw: i32, timestamp_ms: u32) -> Sample {
    match registry.get(channel) {
        Some(known) => Sample {
            timestamp_ms,
            channel,
            name: known.name().to_string(),
            raw,
            value: known.to_physical(raw),
            unit: known.unit().to_string(),
        },
        None => Sample {
            timestamp_ms,
            channel,
            name: format!("channel_{}", channel),
            raw,
            value: f64::from(raw),
            unit: String::new(),
        },
    }
}
