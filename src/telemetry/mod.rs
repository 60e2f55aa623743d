//! # Telemetry Module
//!
//! Delta-encoded binary flight log.
//!
//! This module handles:
//! - The channel table and per-channel epochs
//! - Value and timestamp record framing
//! - Epoch-based change detection with amortised timestamps
//! - Corruption-safe appends, direct or through a staging ring
//! - Decoding a retrieved log back into physical units

pub mod channel;
pub mod encoder;
pub mod reader;
pub mod record;
pub mod sink;
pub mod staging;
pub mod storage;
