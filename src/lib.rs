//! # Flight Logger Library
//!
//! Model rocket avionics core: launch/landing detection, parachute
//! deployment and a delta-encoded binary flight log.
//!
//! The library is hardware independent. Sensors, the recovery servo, the
//! indicator and the clock are traits in [`hal`]; the log destination is the
//! [`telemetry::storage::Storage`] trait. [`computer::FlightComputer`] runs
//! the control loop over them.

pub mod computer;
pub mod config;
pub mod error;
pub mod flight;
pub mod hal;
pub mod replay;
pub mod telemetry;
