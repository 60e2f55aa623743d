//! # Channel Registry
//!
//! Static description of every logged physical quantity.
//!
//! ## Channel Table
//!
//! | Id | Channel | Epoch | Scale |
//! |----|---------|-------|-------|
//! | 0-2 | Gyro X/Y/Z | 700 | 6548 units per rad/s |
//! | 3-5 | Accel X/Y/Z | 80 | 417 units per m/s^2 |
//! | 6-8 | Mag X/Y/Z | 6842 | 6842 units per gauss |
//! | 9 | Pressure | 5 | 1 unit per Pa (about 1/5 ft) |
//! | 10 | Interior temperature | 256 | 256 units per degC |
//! | 11 | Exterior temperature | 100 | 100 units per degC |
//!
//! Ids must stay below 192: a leading byte of 0xC0 or above marks a
//! timestamp record in the stream. Every channel uses the same 24-bit signed
//! value budget.

use std::collections::HashSet;

use crate::error::{FlightLoggerError, Result};
use crate::hal::SensorFrame;

/// Highest id a channel may use.
pub const MAX_CHANNEL_ID: u8 = 191;

/// Signed bits available for a channel value in a value record.
pub const VALUE_BITS: u32 = 24;

/// Channel ids of the standard table.
pub mod ids {
    pub const GYRO_X: u8 = 0;
    pub const GYRO_Y: u8 = 1;
    pub const GYRO_Z: u8 = 2;
    pub const ACCEL_X: u8 = 3;
    pub const ACCEL_Y: u8 = 4;
    pub const ACCEL_Z: u8 = 5;
    pub const MAG_X: u8 = 6;
    pub const MAG_Y: u8 = 7;
    pub const MAG_Z: u8 = 8;
    pub const PRESSURE: u8 = 9;
    pub const INTERIOR_TEMP: u8 = 10;
    pub const EXTERIOR_TEMP: u8 = 11;
}

/// Number of channels in the standard table.
pub const STANDARD_CHANNEL_COUNT: usize = 12;

/// One logged quantity and the last value written for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    id: u8,
    name: &'static str,
    epoch: u32,
    /// Raw units per physical unit
    scale: f64,
    unit: &'static str,
    last_value: i32,
}

impl Channel {
    #[must_use]
    pub const fn new(id: u8, name: &'static str, epoch: u32, scale: f64, unit: &'static str) -> Self {
        Self {
            id,
            name,
            epoch,
            scale,
            unit,
            last_value: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn unit(&self) -> &'static str {
        self.unit
    }

    pub fn last_value(&self) -> i32 {
        self.last_value
    }

    pub(crate) fn set_last_value(&mut self, value: i32) {
        self.last_value = value;
    }

    /// Whether `value` differs from the last written value by at least the epoch.
    #[must_use]
    pub fn exceeds_epoch(&self, value: i32) -> bool {
        let delta = (i64::from(value) - i64::from(self.last_value)).unsigned_abs();
        delta >= u64::from(self.epoch)
    }

    /// Converts a raw value to physical units.
    #[must_use]
    pub fn to_physical(&self, raw: i32) -> f64 {
        f64::from(raw) / self.scale
    }
}

/// Ordered set of channels, keyed by id.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Builds a registry, rejecting ids in the timestamp marker range and duplicates.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChannel` for an id above [`MAX_CHANNEL_ID`] or a repeated id.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        let mut seen = HashSet::new();
        for channel in &channels {
            if channel.id > MAX_CHANNEL_ID || !seen.insert(channel.id) {
                return Err(FlightLoggerError::InvalidChannel(channel.id));
            }
        }
        Ok(Self { channels })
    }

    /// The twelve-channel table flown on the avionics board.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            channels: vec![
                Channel::new(ids::GYRO_X, "gyro_x", 700, 6548.0, "rad/s"),
                Channel::new(ids::GYRO_Y, "gyro_y", 700, 6548.0, "rad/s"),
                Channel::new(ids::GYRO_Z, "gyro_z", 700, 6548.0, "rad/s"),
                Channel::new(ids::ACCEL_X, "accel_x", 80, 417.0, "m/s^2"),
                Channel::new(ids::ACCEL_Y, "accel_y", 80, 417.0, "m/s^2"),
                Channel::new(ids::ACCEL_Z, "accel_z", 80, 417.0, "m/s^2"),
                Channel::new(ids::MAG_X, "mag_x", 6842, 6842.0, "gauss"),
                Channel::new(ids::MAG_Y, "mag_y", 6842, 6842.0, "gauss"),
                Channel::new(ids::MAG_Z, "mag_z", 6842, 6842.0, "gauss"),
                Channel::new(ids::PRESSURE, "pressure", 5, 1.0, "Pa"),
                Channel::new(ids::INTERIOR_TEMP, "interior_temp", 256, 256.0, "degC"),
                Channel::new(ids::EXTERIOR_TEMP, "exterior_temp", 100, 100.0, "degC"),
            ],
        }
    }

    pub fn get(&self, id: u8) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Raw channel values carried by a sensor frame, in standard-table id order.
#[must_use]
pub fn standard_readings(frame: &SensorFrame) -> [(u8, i32); STANDARD_CHANNEL_COUNT] {
    [
        (ids::GYRO_X, frame.raw_gyro[0]),
        (ids::GYRO_Y, frame.raw_gyro[1]),
        (ids::GYRO_Z, frame.raw_gyro[2]),
        (ids::ACCEL_X, frame.raw_accel[0]),
        (ids::ACCEL_Y, frame.raw_accel[1]),
        (ids::ACCEL_Z, frame.raw_accel[2]),
        (ids::MAG_X, frame.raw_mag[0]),
        (ids::MAG_Y, frame.raw_mag[1]),
        (ids::MAG_Z, frame.raw_mag[2]),
        (ids::PRESSURE, frame.pressure_pa as i32),
        (ids::INTERIOR_TEMP, frame.raw_temp),
        (ids::EXTERIOR_TEMP, (frame.exterior_temp_c * 100.0) as i32),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let registry = ChannelRegistry::standard();
        assert_eq!(registry.len(), STANDARD_CHANNEL_COUNT);
        for (expected_id, channel) in registry.iter().enumerate() {
            assert_eq!(channel.id() as usize, expected_id);
            assert_eq!(channel.last_value(), 0);
        }
        assert_eq!(registry.get(ids::ACCEL_Z).unwrap().epoch(), 80);
        assert_eq!(registry.get(ids::PRESSURE).unwrap().epoch(), 5);
        assert_eq!(registry.get(ids::MAG_X).unwrap().epoch(), 6842);
    }

    #[test]
    fn test_rejects_timestamp_marker_ids() {
        let result = ChannelRegistry::new(vec![Channel::new(192, "bad", 1, 1.0, "")]);
        assert!(matches!(result, Err(FlightLoggerError::InvalidChannel(192))));

        let ok = ChannelRegistry::new(vec![Channel::new(MAX_CHANNEL_ID, "edge", 1, 1.0, "")]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = ChannelRegistry::new(vec![
            Channel::new(3, "a", 1, 1.0, ""),
            Channel::new(3, "b", 1, 1.0, ""),
        ]);
        assert!(matches!(result, Err(FlightLoggerError::InvalidChannel(3))));
    }

    #[test]
    fn test_epoch_comparison_is_inclusive() {
        let mut channel = Channel::new(5, "accel_z", 80, 417.0, "m/s^2");
        channel.set_last_value(1000);
        assert!(!channel.exceeds_epoch(1079));
        assert!(channel.exceeds_epoch(1080));
        assert!(channel.exceeds_epoch(920));
        assert!(!channel.exceeds_epoch(921));
    }

    #[test]
    fn test_epoch_comparison_does_not_overflow() {
        let mut channel = Channel::new(0, "x", 1, 1.0, "");
        channel.set_last_value(i32::MIN);
        assert!(channel.exceeds_epoch(i32::MAX));
    }

    #[test]
    fn test_physical_conversion() {
        let registry = ChannelRegistry::standard();
        let accel = registry.get(ids::ACCEL_X).unwrap();
        assert!((accel.to_physical(4170) - 10.0).abs() < 1e-9);
        let temp = registry.get(ids::EXTERIOR_TEMP).unwrap();
        assert!((temp.to_physical(2150) - 21.5).abs() < 1e-9);
    }

    #[test]
    fn test_standard_readings_order_and_scaling() {
        let frame = SensorFrame {
            raw_gyro: [1, 2, 3],
            raw_accel: [4, 5, 6],
            raw_temp: 7,
            raw_mag: [8, 9, 10],
            accel_mps2: [0.0; 3],
            pressure_pa: 101_325.6,
            exterior_temp_c: 21.5,
        };
        let readings = standard_readings(&frame);
        let order: Vec<u8> = readings.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, (0..12).collect::<Vec<u8>>());
        assert_eq!(readings[ids::PRESSURE as usize].1, 101_325);
        assert_eq!(readings[ids::INTERIOR_TEMP as usize].1, 7);
        assert_eq!(readings[ids::EXTERIOR_TEMP as usize].1, 2150);
        assert_eq!(readings[ids::MAG_Z as usize].1, 10);
    }
}
