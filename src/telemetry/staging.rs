//! # Staging Buffer
//!
//! Bounded circular byte region holding complete, not-yet-durable records.
//!
//! Records are only ever enqueued and dequeued whole. When a record does not
//! fit in the space left before the end of the region, the tail wraps to the
//! start and the unused gap is remembered as the logical end of the older
//! segment, so no record is split across the boundary.
//!
//! ```text
//!  not wrapped:   [ free | head .. data .. tail | free ]
//!  wrapped:       [ data .. tail | free | head .. data .. wrap_end | gap ]
//! ```

use super::record::frame_len;
use crate::error::{FlightLoggerError, Result};

/// Circular buffer of whole log records.
#[derive(Debug)]
pub struct StagingBuffer {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    wrap_end: usize,
    wrapped: bool,
    used: usize,
    records: usize,
}

impl StagingBuffer {
    /// Creates an empty buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            wrap_end: capacity,
            wrapped: false,
            used: 0,
            records: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes held.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Whole records held.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Largest record that could be enqueued right now.
    pub fn contiguous_free(&self) -> usize {
        if self.wrapped {
            self.head - self.tail
        } else {
            (self.capacity() - self.tail).max(self.head)
        }
    }

    /// Appends one complete record.
    ///
    /// # Errors
    ///
    /// Returns `StagingFull` if no contiguous run of free bytes can hold it.
    pub fn push(&mut self, record: &[u8]) -> Result<()> {
        let len = record.len();

        let start = if self.wrapped {
            if len > self.head - self.tail {
                return Err(self.full_error(len));
            }
            self.tail
        } else if len <= self.capacity() - self.tail {
            self.tail
        } else if len <= self.head {
            self.wrap_end = self.tail;
            self.wrapped = true;
            0
        } else {
            return Err(self.full_error(len));
        };

        self.buf[start..start + len].copy_from_slice(record);
        self.tail = start + len;
        self.used += len;
        self.records += 1;
        Ok(())
    }

    /// The oldest contiguous run of whole records that fits in `max_bytes`.
    ///
    /// # Returns
    ///
    /// `(bytes, record_count)`; empty when nothing is staged or the first
    /// record alone is larger than `max_bytes`.
    pub fn peek(&self, max_bytes: usize) -> (&[u8], usize) {
        let segment_end = if self.wrapped { self.wrap_end } else { self.tail };
        let segment = &self.buf[self.head..segment_end];
        let taken = whole_records(segment, max_bytes);
        (&segment[..taken.0], taken.1)
    }

    /// Drops `bytes` (made of `records` whole records) from the head after they were persisted.
    pub fn consume(&mut self, bytes: usize, records: usize) {
        debug_assert!(records <= self.records && bytes <= self.used);
        self.head += bytes;
        self.used -= bytes;
        self.records -= records;

        if self.wrapped && self.head >= self.wrap_end {
            self.head = 0;
            self.wrapped = false;
            self.wrap_end = self.capacity();
        }
        if self.records == 0 {
            self.head = 0;
            self.tail = 0;
            self.wrapped = false;
            self.wrap_end = self.capacity();
        }
    }

    fn full_error(&self, needed: usize) -> FlightLoggerError {
        FlightLoggerError::StagingFull {
            needed,
            free: self.contiguous_free(),
        }
    }
}

/// Length and count of the whole records at the start of `bytes` that fit in `max_bytes`.
///
/// Record boundaries come from each record's leading byte.
pub fn whole_records(bytes: &[u8], max_bytes: usize) -> (usize, usize) {
    let mut offset = 0;
    let mut count = 0;
    while offset < bytes.len() {
        let Some(len) = frame_len(bytes[offset]) else {
            break;
        };
        if offset + len > max_bytes || offset + len > bytes.len() {
            break;
        }
        offset += len;
        count += 1;
    }
    (offset, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::record::{LogRecord, TIMESTAMP_RECORD_SIZE, VALUE_RECORD_SIZE};

    fn value(channel: u8, v: i32) -> Vec<u8> {
        LogRecord::value(channel, v).unwrap().to_bytes()
    }

    fn stamp(count: usize, t: u64) -> Vec<u8> {
        LogRecord::timestamp(count, t).unwrap().to_bytes()
    }

    #[test]
    fn test_push_and_peek_in_order() {
        let mut staging = StagingBuffer::new(64);
        staging.push(&value(1, 10)).unwrap();
        staging.push(&value(2, 20)).unwrap();
        staging.push(&stamp(2, 500)).unwrap();
        assert_eq!(staging.records(), 3);
        assert_eq!(staging.len(), 16);

        let (bytes, count) = staging.peek(usize::MAX);
        assert_eq!(count, 3);
        let mut expected = value(1, 10);
        expected.extend(value(2, 20));
        expected.extend(stamp(2, 500));
        assert_eq!(bytes, expected.as_slice());
    }

    #[test]
    fn test_peek_respects_limit_with_whole_records() {
        let mut staging = StagingBuffer::new(64);
        staging.push(&value(1, 10)).unwrap();
        staging.push(&stamp(1, 500)).unwrap();

        // 10 bytes allowed: the value record fits, the timestamp record does not
        let (bytes, count) = staging.peek(10);
        assert_eq!((bytes.len(), count), (VALUE_RECORD_SIZE, 1));

        // Nothing fits in 3 bytes
        let (bytes, count) = staging.peek(3);
        assert_eq!((bytes.len(), count), (0, 0));
    }

    #[test]
    fn test_consume_resets_when_empty() {
        let mut staging = StagingBuffer::new(16);
        staging.push(&value(1, 10)).unwrap();
        staging.consume(VALUE_RECORD_SIZE, 1);
        assert!(staging.is_empty());
        assert_eq!(staging.len(), 0);
        assert_eq!(staging.contiguous_free(), 16);
    }

    #[test]
    fn test_full_buffer_rejects_record() {
        let mut staging = StagingBuffer::new(12);
        staging.push(&stamp(0, 1)).unwrap();
        staging.push(&value(1, 1)).unwrap();
        let err = staging.push(&value(2, 2)).unwrap_err();
        assert!(matches!(err, FlightLoggerError::StagingFull { needed: 4, free: 0 }));
        assert_eq!(staging.records(), 2);
    }

    #[test]
    fn test_wraps_without_splitting_record() {
        // 20 bytes: two timestamps (16) then drain one, then a timestamp cannot fit
        // in the 4 bytes at the end and must wrap to the front.
        let mut staging = StagingBuffer::new(20);
        staging.push(&stamp(0, 1)).unwrap();
        staging.push(&stamp(0, 2)).unwrap();
        staging.consume(TIMESTAMP_RECORD_SIZE, 1);

        staging.push(&stamp(0, 3)).unwrap();
        assert_eq!(staging.records(), 2);

        // First segment ends at the gap, before the wrapped record
        let (bytes, count) = staging.peek(usize::MAX);
        assert_eq!(count, 1);
        assert_eq!(bytes, stamp(0, 2).as_slice());
        let len = bytes.len();
        staging.consume(len, count);

        let (bytes, count) = staging.peek(usize::MAX);
        assert_eq!(count, 1);
        assert_eq!(bytes, stamp(0, 3).as_slice());
    }

    #[test]
    fn test_wrapped_space_is_bounded_by_head() {
        let mut staging = StagingBuffer::new(20);
        staging.push(&stamp(0, 1)).unwrap(); // [0, 8)
        staging.push(&stamp(0, 2)).unwrap(); // [8, 16)
        staging.consume(TIMESTAMP_RECORD_SIZE, 1); // head = 8

        staging.push(&value(1, 1)).unwrap(); // fits at [16, 20)
        staging.push(&value(1, 2)).unwrap(); // wraps to [0, 4)
        staging.push(&value(1, 3)).unwrap(); // [4, 8)
        assert!(staging.push(&value(1, 4)).is_err());
        assert_eq!(staging.records(), 4);

        let mut drained = Vec::new();
        while !staging.is_empty() {
            let (bytes, count) = staging.peek(usize::MAX);
            drained.extend_from_slice(bytes);
            let len = bytes.len();
            staging.consume(len, count);
        }
        let mut expected = stamp(0, 2);
        expected.extend(value(1, 1));
        expected.extend(value(1, 2));
        expected.extend(value(1, 3));
        assert_eq!(drained, expected);
    }

    #[test]
    fn test_whole_records_helper() {
        let mut bytes = value(1, 1);
        bytes.extend(stamp(1, 9));
        assert_eq!(whole_records(&bytes, usize::MAX), (12, 2));
        assert_eq!(whole_records(&bytes, 11), (4, 1));
        assert_eq!(whole_records(&bytes[..10], usize::MAX), (4, 1));
    }
}
