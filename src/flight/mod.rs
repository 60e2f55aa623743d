//! # Flight Module
//!
//! Flight-event detection and recovery control.
//!
//! This module handles:
//! - Launch detection from a smoothed acceleration window
//! - Landing detection by elapsed time since launch
//! - Barometric altitude and descent-trend hysteresis
//! - One-shot parachute deployment

pub mod launch;
pub mod recovery;
