//! # Error Types
//!
//! Custom error types for the flight logger using `thiserror`.

use thiserror::Error;

/// Main error type for the flight logger
#[derive(Debug, Error)]
pub enum FlightLoggerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sensor trace parse errors
    #[error("Trace error: {0}")]
    Trace(#[from] serde_json::Error),

    /// A channel value does not fit the channel's bit budget
    #[error("Value {value} for channel {channel} does not fit in {bits} signed bits")]
    ValueOutOfRange {
        /// Channel id
        channel: u8,
        /// Rejected raw value
        value: i32,
        /// Bit budget of the channel
        bits: u32,
    },

    /// Timestamp record count does not fit in 8 bits
    #[error("Record count {0} does not fit in a timestamp record")]
    CountOutOfRange(usize),

    /// Channel id collides with the timestamp marker range
    #[error("Invalid channel id {0} (must be below 192)")]
    InvalidChannel(u8),

    /// Byte stream does not start a known record at this offset
    #[error("Malformed record at offset {offset}: leading byte 0x{byte:02X}")]
    MalformedRecord {
        /// Offset into the stream
        offset: usize,
        /// Offending leading byte
        byte: u8,
    },

    /// Sensor acquisition errors
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Backing store accepted no bytes
    #[error("Storage exhausted")]
    StorageExhausted,

    /// Staging ring has no room for a record even after draining
    #[error("Staging buffer full: need {needed} bytes, {free} free")]
    StagingFull {
        /// Bytes the record needs
        needed: usize,
        /// Bytes currently free
        free: usize,
    },
}

/// Result type alias for the flight logger
pub type Result<T> = std::result::Result<T, FlightLoggerError>;

/// Why the control loop stopped for good.
///
/// Once a loop reports one of these it performs no further logging; the
/// driver repeats the fault indicator pattern until power is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// A sensor failed to initialise at boot
    SensorInit(String),
    /// The log destination could not be opened
    StorageInit(String),
    /// A hard write error or exhausted storage during the session
    StorageFailure(String),
    /// Operator requested the boot-time erase of the log file
    RecoveryErase {
        /// Whether the file was actually removed
        erased: bool,
    },
}

impl HaltReason {
    /// Whether the halt is a failure (as opposed to a completed operator erase)
    pub fn is_failure(&self) -> bool {
        !matches!(self, HaltReason::RecoveryErase { erased: true })
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::SensorInit(msg) => write!(f, "Failed to initialize sensor: {}", msg),
            HaltReason::StorageInit(msg) => write!(f, "Failed to open log: {}", msg),
            HaltReason::StorageFailure(msg) => write!(f, "Log write failed: {}", msg),
            HaltReason::RecoveryErase { erased: true } => write!(f, "Recovery erase complete"),
            HaltReason::RecoveryErase { erased: false } => {
                write!(f, "Recovery failed. Consider reformatting storage")
            }
        }
    }
}
