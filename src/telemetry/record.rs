//! # Log Record Framing
//!
//! The two fixed-size records sharing the log stream.
//!
//! ## Value record (4 bytes)
//!
//! One little-endian 32-bit word:
//!
//! ```text
//! bit 31                      8 7          0
//!     +------------------------+------------+
//!     | value (24-bit signed)  | channel id |
//!     +------------------------+------------+
//! ```
//!
//! The channel id is below 192, so the first byte on disk is always `< 0xC0`.
//!
//! ## Timestamp record (8 bytes)
//!
//! Two little-endian 32-bit words:
//!
//! ```text
//! word 0: (count << 24) | 0x00FFFFFF
//! word 1: timestamp in milliseconds since boot (low 32 bits)
//! ```
//!
//! On disk the record starts with three `0xFF` bytes, followed by the count of
//! value records that precede it and share its timestamp.

use bytes::{Buf, BufMut};

use super::channel::{MAX_CHANNEL_ID, VALUE_BITS};
use crate::error::{FlightLoggerError, Result};

/// Size of a value record on disk.
pub const VALUE_RECORD_SIZE: usize = 4;

/// Size of a timestamp record on disk.
pub const TIMESTAMP_RECORD_SIZE: usize = 8;

/// Low 24 bits of the first timestamp word.
pub const TIMESTAMP_SENTINEL: u32 = 0x00FF_FFFF;

/// Leading byte of every timestamp record.
pub const TIMESTAMP_LEAD_BYTE: u8 = 0xFF;

/// Smallest value that fits the value field.
pub const VALUE_MIN: i32 = -(1 << (VALUE_BITS - 1));

/// Largest value that fits the value field.
pub const VALUE_MAX: i32 = (1 << (VALUE_BITS - 1)) - 1;

/// A decoded or to-be-encoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecord {
    /// A channel value
    Value { channel: u8, value: i32 },
    /// Amortised timestamp for the preceding `count` value records
    Timestamp { count: u8, timestamp_ms: u32 },
}

impl LogRecord {
    /// Builds a value record, range-checking the id and the value.
    ///
    /// # Errors
    ///
    /// - `InvalidChannel` if `channel` is above 191
    /// - `ValueOutOfRange` if `value` needs more than 24 signed bits
    ///
    /// # Examples
    ///
    /// ```
    /// use flight_logger::telemetry::record::LogRecord;
    ///
    /// let record = LogRecord::value(5, 1000).unwrap();
    /// let bytes = record.to_bytes();
    /// assert_eq!(LogRecord::decode(&bytes).unwrap(), Some((record, 4)));
    /// ```
    pub fn value(channel: u8, value: i32) -> Result<Self> {
        if channel > MAX_CHANNEL_ID {
            return Err(FlightLoggerError::InvalidChannel(channel));
        }
        if !(VALUE_MIN..=VALUE_MAX).contains(&value) {
            return Err(FlightLoggerError::ValueOutOfRange {
                channel,
                value,
                bits: VALUE_BITS,
            });
        }
        Ok(LogRecord::Value { channel, value })
    }

    /// Builds a timestamp record.
    ///
    /// The timestamp keeps the low 32 bits of `now_ms`, wrapping like a
    /// millisecond tick counter.
    ///
    /// # Errors
    ///
    /// Returns `CountOutOfRange` if `count` exceeds 255.
    pub fn timestamp(count: usize, now_ms: u64) -> Result<Self> {
        let count = u8::try_from(count).map_err(|_| FlightLoggerError::CountOutOfRange(count))?;
        Ok(LogRecord::Timestamp {
            count,
            timestamp_ms: now_ms as u32,
        })
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            LogRecord::Value { .. } => VALUE_RECORD_SIZE,
            LogRecord::Timestamp { .. } => TIMESTAMP_RECORD_SIZE,
        }
    }

    /// Appends the on-disk form to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        match *self {
            LogRecord::Value { channel, value } => {
                buf.put_u32_le(((value as u32) << 8) | u32::from(channel));
            }
            LogRecord::Timestamp { count, timestamp_ms } => {
                buf.put_u32_le((u32::from(count) << 24) | TIMESTAMP_SENTINEL);
                buf.put_u32_le(timestamp_ms);
            }
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes the record at the start of `buf`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((record, consumed)))` - a complete record
    /// * `Ok(None)` - `buf` is empty or holds only the start of a record
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` (offset 0) if the leading bytes match neither shape.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some(&lead) = buf.first() else {
            return Ok(None);
        };
        let len = frame_len(lead).ok_or(FlightLoggerError::MalformedRecord { offset: 0, byte: lead })?;
        if buf.len() < len {
            return Ok(None);
        }

        let mut cursor = &buf[..len];
        let word = cursor.get_u32_le();
        if len == VALUE_RECORD_SIZE {
            let channel = (word & 0xFF) as u8;
            let value = (word as i32) >> 8;
            return Ok(Some((LogRecord::Value { channel, value }, len)));
        }

        if word & TIMESTAMP_SENTINEL != TIMESTAMP_SENTINEL {
            return Err(FlightLoggerError::MalformedRecord { offset: 0, byte: lead });
        }
        let count = (word >> 24) as u8;
        let timestamp_ms = cursor.get_u32_le();
        Ok(Some((LogRecord::Timestamp { count, timestamp_ms }, len)))
    }
}

/// Record length implied by a record's first byte, `None` if no record starts that way.
#[must_use]
pub fn frame_len(lead: u8) -> Option<usize> {
    match lead {
        id if id <= MAX_CHANNEL_ID => Some(VALUE_RECORD_SIZE),
        TIMESTAMP_LEAD_BYTE => Some(TIMESTAMP_RECORD_SIZE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_record_layout() {
        let bytes = LogRecord::value(5, 1000).unwrap().to_bytes();
        // (1000 << 8) | 5 = 0x0003E805
        assert_eq!(bytes, vec![0x05, 0xE8, 0x03, 0x00]);
    }

    #[test]
    fn test_value_record_round_trip() {
        let record = LogRecord::value(5, 1000).unwrap();
        let (decoded, used) = LogRecord::decode(&record.to_bytes()).unwrap().unwrap();
        assert_eq!(decoded, LogRecord::Value { channel: 5, value: 1000 });
        assert_eq!(used, VALUE_RECORD_SIZE);
    }

    #[test]
    fn test_value_record_sign_extension_at_limits() {
        for value in [VALUE_MIN, -1, 0, 1, VALUE_MAX] {
            let record = LogRecord::value(MAX_CHANNEL_ID, value).unwrap();
            let (decoded, _) = LogRecord::decode(&record.to_bytes()).unwrap().unwrap();
            assert_eq!(decoded, record, "value {}", value);
        }
    }

    #[test]
    fn test_value_out_of_range_rejected() {
        assert!(matches!(
            LogRecord::value(9, VALUE_MAX + 1),
            Err(FlightLoggerError::ValueOutOfRange { channel: 9, bits: 24, .. })
        ));
        assert!(LogRecord::value(9, VALUE_MIN - 1).is_err());
        assert!(LogRecord::value(9, i32::MAX).is_err());
    }

    #[test]
    fn test_invalid_channel_rejected() {
        assert!(matches!(LogRecord::value(192, 0), Err(FlightLoggerError::InvalidChannel(192))));
        assert!(matches!(LogRecord::value(0xFF, 0), Err(FlightLoggerError::InvalidChannel(0xFF))));
    }

    #[test]
    fn test_timestamp_record_layout() {
        let bytes = LogRecord::timestamp(12, 0x0102_0304).unwrap().to_bytes();
        assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 12, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_timestamp_wraps_to_32_bits() {
        let record = LogRecord::timestamp(1, (1u64 << 32) + 7).unwrap();
        assert_eq!(record, LogRecord::Timestamp { count: 1, timestamp_ms: 7 });
    }

    #[test]
    fn test_timestamp_count_limit() {
        assert!(LogRecord::timestamp(255, 0).is_ok());
        assert!(matches!(LogRecord::timestamp(256, 0), Err(FlightLoggerError::CountOutOfRange(256))));
    }

    #[test]
    fn test_decode_truncated_returns_none() {
        let value = LogRecord::value(1, 42).unwrap().to_bytes();
        assert_eq!(LogRecord::decode(&value[..3]).unwrap(), None);

        let stamp = LogRecord::timestamp(3, 99).unwrap().to_bytes();
        assert_eq!(LogRecord::decode(&stamp[..7]).unwrap(), None);
        assert_eq!(LogRecord::decode(&[]).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_unknown_lead_byte() {
        let result = LogRecord::decode(&[0xC5, 0, 0, 0]);
        assert!(matches!(result, Err(FlightLoggerError::MalformedRecord { byte: 0xC5, .. })));
    }

    #[test]
    fn test_decode_rejects_broken_sentinel() {
        let result = LogRecord::decode(&[0xFF, 0x00, 0xFF, 1, 0, 0, 0, 0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len(0), Some(VALUE_RECORD_SIZE));
        assert_eq!(frame_len(191), Some(VALUE_RECORD_SIZE));
        assert_eq!(frame_len(192), None);
        assert_eq!(frame_len(0xFF), Some(TIMESTAMP_RECORD_SIZE));
    }
}
