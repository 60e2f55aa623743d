//! Host-side collaborator implementations.
//!
//! Indicator and servo stand-ins for the replay binary and tests; they report
//! through `tracing`. The replay clock is the trace itself
//! ([`crate::replay::TraceSource`]).

use tracing::{info, warn};

use super::{Actuator, Indicator};

/// Indicator that reports through the tracing log
#[derive(Debug, Default)]
pub struct TracingIndicator {
    fault_pulses: u64,
}

impl TracingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fault pulses emitted so far
    pub fn fault_pulses(&self) -> u64 {
        self.fault_pulses
    }
}

impl Indicator for TracingIndicator {
    fn launch_detected(&mut self) {
        info!("Launch tone");
    }

    fn logging_armed(&mut self) {
        info!("Logging will start shortly");
    }

    fn fault_pulse(&mut self) {
        self.fault_pulses += 1;
        warn!("Fault pulse #{}", self.fault_pulses);
    }
}

/// Servo stand-in remembering the last commanded angle
#[derive(Debug, Default)]
pub struct LoggedServo {
    position: Option<u8>,
    commands: u32,
}

impl LoggedServo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded angle, if any
    pub fn position(&self) -> Option<u8> {
        self.position
    }

    /// Number of position commands received
    pub fn commands(&self) -> u32 {
        self.commands
    }
}

impl Actuator for LoggedServo {
    fn set_position(&mut self, angle_deg: u8) {
        self.position = Some(angle_deg);
        self.commands += 1;
        info!("Servo -> {} deg", angle_deg);
    }
}
