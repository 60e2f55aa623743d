//! # Delta Log Encoder
//!
//! Decides which channel values are worth persisting and frames them.
//!
//! This module handles:
//! - Epoch comparison against each channel's last written value
//! - The unconditional baseline log at session start
//! - One amortised timestamp record per tick, counting the value records before it
//!
//! A channel's `last_value` only moves when its record was accepted by the
//! sink, so a rolled-back or out-of-range value is compared again next tick.
//! Value records whose timestamp was rolled back stay pending and are counted
//! by the next timestamp record that lands.

use bytes::BytesMut;
use tracing::{debug, warn};

use super::channel::{Channel, ChannelRegistry};
use super::record::{LogRecord, TIMESTAMP_RECORD_SIZE};
use super::sink::RecordSink;
use crate::error::{FlightLoggerError, Result};

/// Frames value and timestamp records into a sink
#[derive(Debug)]
pub struct DeltaLogEncoder {
    scratch: BytesMut,
    /// Accepted value records not yet covered by a timestamp record
    pending: usize,
}

impl DeltaLogEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scratch: BytesMut::with_capacity(TIMESTAMP_RECORD_SIZE),
            pending: 0,
        }
    }

    /// Accepted value records still waiting for a timestamp record
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Writes `value` for `channel` without comparing it to the last value.
    ///
    /// Used once per channel at session start so every channel has a baseline
    /// in the stream.
    ///
    /// # Returns
    ///
    /// Number of records accepted by the sink (0 or 1).
    ///
    /// # Errors
    ///
    /// Fatal sink errors only. An out-of-range value is skipped with a warning.
    pub fn initial_log<S: RecordSink + ?Sized>(
        &mut self,
        value: i32,
        channel: &mut Channel,
        sink: &mut S,
    ) -> Result<usize> {
        self.emit_value(value, channel, sink)
    }

    /// Writes `value` for `channel` if it moved at least one epoch since the last write.
    ///
    /// # Returns
    ///
    /// Number of records accepted by the sink (0 or 1).
    ///
    /// # Errors
    ///
    /// Fatal sink errors only.
    pub fn log_if_above_epoch<S: RecordSink + ?Sized>(
        &mut self,
        value: i32,
        channel: &mut Channel,
        sink: &mut S,
    ) -> Result<usize> {
        if !channel.exceeds_epoch(value) {
            return Ok(0);
        }
        self.emit_value(value, channel, sink)
    }

    /// Writes a timestamp record for the `count` value records just emitted.
    ///
    /// # Returns
    ///
    /// `true` if the sink accepted the record.
    pub fn log_timestamp<S: RecordSink + ?Sized>(
        &mut self,
        count: usize,
        now_ms: u64,
        sink: &mut S,
    ) -> Result<bool> {
        let record = LogRecord::timestamp(count, now_ms)?;
        self.append(&record, sink)
    }

    /// Runs one tick over a set of readings and closes it with a timestamp.
    ///
    /// With `baseline` set every reading is written unconditionally, otherwise
    /// only readings that crossed their channel's epoch. The timestamp record
    /// is only written when value records are waiting for one. Its count
    /// includes records from earlier ticks whose timestamp was rolled back.
    ///
    /// # Arguments
    ///
    /// * `registry` - Channels to compare against and update
    /// * `readings` - `(channel id, raw value)` pairs, written in slice order
    /// * `now_ms` - Tick time in milliseconds since boot
    /// * `baseline` - Skip the epoch comparison
    ///
    /// # Returns
    ///
    /// Number of value records accepted this tick.
    ///
    /// # Errors
    ///
    /// - `InvalidChannel` if a reading names a channel the registry lacks
    /// - Fatal sink errors
    pub fn log_readings<S: RecordSink + ?Sized>(
        &mut self,
        registry: &mut ChannelRegistry,
        readings: &[(u8, i32)],
        now_ms: u64,
        baseline: bool,
        sink: &mut S,
    ) -> Result<usize> {
        let mut count = 0;
        for &(id, value) in readings {
            let channel = registry
                .get_mut(id)
                .ok_or(FlightLoggerError::InvalidChannel(id))?;
            count += if baseline {
                self.initial_log(value, channel, sink)?
            } else {
                self.log_if_above_epoch(value, channel, sink)?
            };
        }

        self.pending += count;
        if self.pending > 0 {
            if self.log_timestamp(self.pending, now_ms, sink)? {
                debug!("Logged {} records at {} ms", self.pending, now_ms);
                self.pending = 0;
            } else {
                warn!("Timestamp at {} ms rolled back, {} records pending", now_ms, self.pending);
            }
        }
        Ok(count)
    }

    fn emit_value<S: RecordSink + ?Sized>(
        &mut self,
        value: i32,
        channel: &mut Channel,
        sink: &mut S,
    ) -> Result<usize> {
        let record = match LogRecord::value(channel.id(), value) {
            Ok(record) => record,
            Err(FlightLoggerError::ValueOutOfRange { bits, .. }) => {
                warn!(
                    "Skipping {} value {} (exceeds {} bits)",
                    channel.name(),
                    value,
                    bits
                );
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        if self.append(&record, sink)? {
            channel.set_last_value(value);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn append<S: RecordSink + ?Sized>(&mut self, record: &LogRecord, sink: &mut S) -> Result<bool> {
        self.scratch.clear();
        record.encode_into(&mut self.scratch);
        sink.append(&self.scratch)
    }
}

impl Default for DeltaLogEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::channel::ids;
    use crate::telemetry::record::VALUE_MAX;
    use crate::telemetry::sink::DirectWriter;
    use crate::telemetry::storage::mocks::MemoryStorage;

    use crate::telemetry::reader::decode_stream;

    fn decode_all(bytes: &[u8]) -> Vec<LogRecord> {
        let mut records = Vec::new();
        let mut offset = 0;
        while let Some((record, used)) = LogRecord::decode(&bytes[offset..]).unwrap() {
            records.push(record);
            offset += used;
        }
        records
    }

    #[test]
    fn test_log_if_above_epoch_threshold() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut channel = Channel::new(ids::ACCEL_Z, "accel_z", 80, 417.0, "m/s^2");

        assert_eq!(encoder.log_if_above_epoch(79, &mut channel, &mut sink).unwrap(), 0);
        assert_eq!(channel.last_value(), 0);

        assert_eq!(encoder.log_if_above_epoch(80, &mut channel, &mut sink).unwrap(), 1);
        assert_eq!(channel.last_value(), 80);

        // Compared against the new last value, not the first one
        assert_eq!(encoder.log_if_above_epoch(150, &mut channel, &mut sink).unwrap(), 0);
        assert_eq!(encoder.log_if_above_epoch(0, &mut channel, &mut sink).unwrap(), 1);

        assert_eq!(
            decode_all(&storage.contents()),
            vec![
                LogRecord::Value { channel: ids::ACCEL_Z, value: 80 },
                LogRecord::Value { channel: ids::ACCEL_Z, value: 0 },
            ]
        );
    }

    #[test]
    fn test_initial_log_is_unconditional() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut channel = Channel::new(ids::PRESSURE, "pressure", 5, 1.0, "Pa");

        assert_eq!(encoder.initial_log(0, &mut channel, &mut sink).unwrap(), 1);
        assert_eq!(encoder.initial_log(2, &mut channel, &mut sink).unwrap(), 1);
        assert_eq!(channel.last_value(), 2);
        assert_eq!(storage.contents().len(), 8);
    }

    #[test]
    fn test_rolled_back_value_keeps_last_value() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut channel = Channel::new(ids::ACCEL_X, "accel_x", 80, 417.0, "m/s^2");

        storage.limit_next_write(2);
        assert_eq!(encoder.log_if_above_epoch(500, &mut channel, &mut sink).unwrap(), 0);
        assert_eq!(channel.last_value(), 0);
        assert!(storage.contents().is_empty());

        // Retried on the next tick
        assert_eq!(encoder.log_if_above_epoch(500, &mut channel, &mut sink).unwrap(), 1);
        assert_eq!(channel.last_value(), 500);
    }

    #[test]
    fn test_out_of_range_value_is_skipped() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut channel = Channel::new(ids::PRESSURE, "pressure", 5, 1.0, "Pa");

        assert_eq!(encoder.initial_log(VALUE_MAX + 1, &mut channel, &mut sink).unwrap(), 0);
        assert_eq!(channel.last_value(), 0);
        assert!(storage.contents().is_empty());
    }

    #[test]
    fn test_log_readings_amortises_timestamp() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut registry = ChannelRegistry::standard();

        let readings: Vec<(u8, i32)> = (0..12).map(|id| (id, 1000 + i32::from(id))).collect();
        let count = encoder.log_readings(&mut registry, &readings, 0, true, &mut sink).unwrap();
        assert_eq!(count, 12);

        let records = decode_all(&storage.contents());
        assert_eq!(records.len(), 13);
        assert_eq!(records[12], LogRecord::Timestamp { count: 12, timestamp_ms: 0 });
    }

    #[test]
    fn test_log_readings_without_changes_writes_nothing() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut registry = ChannelRegistry::standard();

        let readings: Vec<(u8, i32)> = (0..12).map(|id| (id, 1)).collect();
        let count = encoder.log_readings(&mut registry, &readings, 50, false, &mut sink).unwrap();
        assert_eq!(count, 0);
        assert!(storage.contents().is_empty());
    }

    #[test]
    fn test_log_readings_unknown_channel() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage);
        let mut encoder = DeltaLogEncoder::new();
        let mut registry = ChannelRegistry::standard();

        let result = encoder.log_readings(&mut registry, &[(40, 1)], 0, true, &mut sink);
        assert!(matches!(result, Err(FlightLoggerError::InvalidChannel(40))));
    }

    #[test]
    fn test_timestamp_counts_only_accepted_records() {
        let storage = MemoryStorage::new();
        let mut sink = DirectWriter::new(storage.clone());
        let mut encoder = DeltaLogEncoder::new();
        let mut registry = ChannelRegistry::standard();

        // First value record is torn and rolled back
        storage.limit_next_write(1);
        let readings = [(ids::GYRO_X, 5000), (ids::ACCEL_Z, 900)];
        let count = encoder.log_readings(&mut registry, &readings, 10, false, &mut sink).unwrap();
        assert_eq!(count, 1);

        let records = decode_all(&storage.contents());
        assert_eq!(
            records,
            vec![
                LogRecord::Value { channel: ids::ACCEL_Z, value: 900 },
                LogRecord::Timestamp { count: 1, timestamp_ms: 10 },
            ]
        );
        assert_eq!(registry.get(ids::GYRO_X).unwrap().last_value(), 0);
    }

    /// Sink that cuts one chosen append short
    struct TearingSink {
        inner: DirectWriter<MemoryStorage>,
        storage: MemoryStorage,
        tear_at: usize,
        appends: usize,
    }

    impl TearingSink {
        fn new(tear_at: usize) -> Self {
            let storage = MemoryStorage::new();
            Self {
                inner: DirectWriter::new(storage.clone()),
                storage,
                tear_at,
                appends: 0,
            }
        }
    }

    impl RecordSink for TearingSink {
        fn append(&mut self, record: &[u8]) -> Result<bool> {
            if self.appends == self.tear_at {
                self.storage.limit_next_write(3);
            }
            self.appends += 1;
            self.inner.append(record)
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }

        fn stats(&self) -> crate::telemetry::sink::SinkStats {
            self.inner.stats()
        }
    }

    #[test]
    fn test_rolled_back_timestamp_is_counted_by_next_one() {
        // Append #1 is the first tick's timestamp
        let mut sink = TearingSink::new(1);
        let mut encoder = DeltaLogEncoder::new();
        let mut registry = ChannelRegistry::standard();

        let count = encoder
            .log_readings(&mut registry, &[(ids::GYRO_X, 5000)], 100, false, &mut sink)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(encoder.pending(), 1);
        assert_eq!(sink.storage.contents().len(), 4);

        let count = encoder
            .log_readings(&mut registry, &[(ids::ACCEL_Z, 900)], 5000, false, &mut sink)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(encoder.pending(), 0);

        assert_eq!(
            decode_all(&sink.storage.contents()),
            vec![
                LogRecord::Value { channel: ids::GYRO_X, value: 5000 },
                LogRecord::Value { channel: ids::ACCEL_Z, value: 900 },
                LogRecord::Timestamp { count: 2, timestamp_ms: 5000 },
            ]
        );
        let log = decode_stream(&sink.storage.contents(), &registry).unwrap();
        assert_eq!(log.ticks, 1);
        assert_eq!(log.samples.len(), 2);
        assert_eq!(log.untimed_records, 0);
    }

    #[test]
    fn test_pending_records_timestamped_on_quiet_tick() {
        let mut sink = TearingSink::new(1);
        let mut encoder = DeltaLogEncoder::new();
        let mut registry = ChannelRegistry::standard();

        encoder
            .log_readings(&mut registry, &[(ids::GYRO_X, 5000)], 100, false, &mut sink)
            .unwrap();
        assert_eq!(encoder.pending(), 1);

        // Nothing crosses its epoch, but the waiting record still gets its timestamp
        let count = encoder
            .log_readings(&mut registry, &[(ids::GYRO_X, 5000)], 200, false, &mut sink)
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(encoder.pending(), 0);
        assert_eq!(
            decode_all(&sink.storage.contents()),
            vec![
                LogRecord::Value { channel: ids::GYRO_X, value: 5000 },
                LogRecord::Timestamp { count: 1, timestamp_ms: 200 },
            ]
        );
    }
}
