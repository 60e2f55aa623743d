//! # Hardware Abstraction Module
//!
//! Boundary traits for the collaborators the flight core talks to.
//!
//! This module defines:
//! - Sensor acquisition (`SensorSource`, `SensorFrame`)
//! - The recovery actuator (`Actuator`)
//! - The audible/visual indicator (`Indicator`)
//! - The monotonic clock (`Clock`)
//!
//! Host implementations live in [`host`]; drivers for real boards implement the
//! same traits.

pub mod host;

use serde::Deserialize;

use crate::error::Result;

/// One tick's worth of sensor readings.
///
/// Raw fields are the integer counts the drivers report and are what gets
/// logged; `accel_mps2` and `pressure_pa` are the scaled values the launch
/// estimator and recovery controller consume.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct SensorFrame {
    /// Raw gyroscope counts (x, y, z)
    #[serde(default)]
    pub raw_gyro: [i32; 3],
    /// Raw accelerometer counts (x, y, z)
    #[serde(default)]
    pub raw_accel: [i32; 3],
    /// Raw IMU die temperature counts
    #[serde(default)]
    pub raw_temp: i32,
    /// Raw magnetometer counts (x, y, z)
    #[serde(default)]
    pub raw_mag: [i32; 3],
    /// Acceleration in m/s^2 (x, y, z)
    #[serde(default)]
    pub accel_mps2: [f32; 3],
    /// Barometric pressure in Pa
    #[serde(default)]
    pub pressure_pa: f32,
    /// Barometer temperature in degrees Celsius
    #[serde(default)]
    pub exterior_temp_c: f32,
}

/// Sensor acquisition collaborator
pub trait SensorSource {
    /// Bring the sensors up. Failure here is fatal for the session.
    fn begin(&mut self) -> Result<()>;

    /// Read all sensors for the current tick.
    fn read(&mut self) -> Result<SensorFrame>;
}

/// Recovery actuator (servo) collaborator
#[cfg_attr(test, mockall::automock)]
pub trait Actuator {
    /// Command the actuator to an angle in degrees.
    fn set_position(&mut self, angle_deg: u8);
}

/// Tone/LED indicator collaborator
#[cfg_attr(test, mockall::automock)]
pub trait Indicator {
    /// Signal that a launch was detected.
    fn launch_detected(&mut self);

    /// Signal that logging is about to start.
    fn logging_armed(&mut self);

    /// One pulse of the halt pattern; the driver repeats it while halted.
    fn fault_pulse(&mut self);
}

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since boot.
    fn now_millis(&self) -> u64;
}
