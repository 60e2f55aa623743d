//! # Record Sinks
//!
//! Where encoded records go on their way to storage.
//!
//! - [`DirectWriter`] writes every record straight to storage. A partial write
//!   is rolled back so the stream never holds a truncated record.
//! - [`StagedWriter`] queues records in a [`StagingBuffer`] and drains as many
//!   whole records as the medium reports ready on each pump. A partial drain
//!   keeps the whole records that landed, rolls back the rest and retries later.
//!
//! Storage accepting zero bytes, or failing outright, ends the session.

use std::io;
use tracing::{debug, warn};

use super::staging::{whole_records, StagingBuffer};
use super::storage::Storage;
use crate::error::{FlightLoggerError, Result};

/// Counters for the lifetime of a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records accepted (written or staged)
    pub records: u64,
    /// Bytes that reached storage
    pub bytes_written: u64,
    /// Partial writes rolled back
    pub rollbacks: u64,
    pub flushes: u64,
}

/// Destination for encoded records
pub trait RecordSink {
    /// Offer one complete record.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the record is now part of the stream (or staged for it),
    /// `Ok(false)` if a short write was rolled back and the record dropped.
    fn append(&mut self, record: &[u8]) -> Result<bool>;

    /// Move staged records toward storage. No-op for unbuffered sinks.
    fn pump(&mut self) -> Result<()> {
        Ok(())
    }

    /// Make everything accepted so far durable.
    fn flush(&mut self) -> Result<()>;

    fn stats(&self) -> SinkStats;
}

fn write_failure(e: io::Error) -> FlightLoggerError {
    if e.kind() == io::ErrorKind::WriteZero {
        FlightLoggerError::StorageExhausted
    } else {
        FlightLoggerError::Io(e)
    }
}

/// Unbuffered sink with partial-write rollback
#[derive(Debug)]
pub struct DirectWriter<S: Storage> {
    storage: S,
    stats: SinkStats,
}

impl<S: Storage> DirectWriter<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            stats: SinkStats::default(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}

impl<S: Storage> RecordSink for DirectWriter<S> {
    fn append(&mut self, record: &[u8]) -> Result<bool> {
        let written = self.storage.write(record).map_err(write_failure)?;

        if written == record.len() {
            self.stats.records += 1;
            self.stats.bytes_written += written as u64;
            return Ok(true);
        }

        if written == 0 {
            return Err(FlightLoggerError::StorageExhausted);
        }

        // Never leave a partial record in the stream
        self.storage.rewind(written)?;
        self.stats.rollbacks += 1;
        warn!("Short write ({} of {} bytes), rolled back", written, record.len());
        Ok(false)
    }

    fn flush(&mut self) -> Result<()> {
        self.storage.flush()?;
        self.stats.flushes += 1;
        Ok(())
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}

/// Sink decoupling record production from storage bandwidth
#[derive(Debug)]
pub struct StagedWriter<S: Storage> {
    storage: S,
    staging: StagingBuffer,
    stats: SinkStats,
}

impl<S: Storage> StagedWriter<S> {
    pub fn new(storage: S, capacity: usize) -> Self {
        Self {
            storage,
            staging: StagingBuffer::new(capacity),
            stats: SinkStats::default(),
        }
    }

    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: Storage> RecordSink for StagedWriter<S> {
    fn append(&mut self, record: &[u8]) -> Result<bool> {
        match self.staging.push(record) {
            Ok(()) => {}
            Err(FlightLoggerError::StagingFull { .. }) => {
                // Backpressure: make room by draining, then try once more
                self.pump()?;
                self.staging.push(record)?;
            }
            Err(e) => return Err(e),
        }
        self.stats.records += 1;
        Ok(true)
    }

    fn pump(&mut self) -> Result<()> {
        while !self.staging.is_empty() {
            let ready = self.storage.available_for_write();
            let (chunk, count) = self.staging.peek(ready);
            if count == 0 {
                break;
            }
            let len = chunk.len();

            let written = self.storage.write(chunk).map_err(write_failure)?;
            if written == 0 {
                return Err(FlightLoggerError::StorageExhausted);
            }

            if written == len {
                self.staging.consume(len, count);
                self.stats.bytes_written += len as u64;
                debug!("Drained {} records ({} bytes)", count, len);
                continue;
            }

            // Keep the whole records that made it, roll back the torn one
            let (kept, kept_count) = whole_records(chunk, written);
            let torn = written - kept;
            if torn > 0 {
                self.storage.rewind(torn)?;
                self.stats.rollbacks += 1;
            }
            self.staging.consume(kept, kept_count);
            self.stats.bytes_written += kept as u64;
            warn!(
                "Short drain ({} of {} bytes), kept {} records, {} staged",
                written,
                len,
                kept_count,
                self.staging.records()
            );
            break;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.pump()?;
        self.storage.flush()?;
        self.stats.flushes += 1;
        Ok(())
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}
