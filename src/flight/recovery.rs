//! # Recovery Deployment Module
//!
//! Drives the parachute release actuator from barometric altitude trend.
//!
//! ## Altitude
//!
//! Pressure is converted with the international barometric formula:
//!
//! ```text
//! altitude_ft = 44330 * 3.28084 * (1 - (P / P0)^0.1903)
//! ```
//!
//! with `P` and `P0` in hPa (`P0` = 1013.25 by default). The altitude at
//! [`RecoveryDeploymentController::setup`] becomes the ground baseline and
//! every later reading is relative to it.
//!
//! ## Descent hysteresis
//!
//! Updates are rate limited (1 s by default). Each eligible update bumps the
//! descent streak when the relative altitude dropped since the previous one
//! and decrements it (floored at zero) otherwise. Deployment fires once the
//! streak has reached the threshold and the vehicle is below the deploy
//! altitude. Deployment is one-shot.
//!
//! A descent that never satisfies both conditions before landing is a missed
//! deployment; the controller does not detect or report it.

use tracing::{debug, info};

use crate::config::RecoveryConfig;
use crate::hal::Actuator;

/// Standard sea-level reference pressure in hPa.
pub const DEFAULT_SEA_LEVEL_HPA: f32 = 1013.25;

/// Meters to feet.
const FEET_PER_METER: f32 = 3.28084;

/// Converts a pressure reading to altitude in feet.
///
/// # Arguments
///
/// * `pressure_hpa` - Measured pressure in hPa
/// * `sea_level_hpa` - Reference pressure in hPa
///
/// # Examples
///
/// ```
/// use flight_logger::flight::recovery::{pressure_to_altitude_ft, DEFAULT_SEA_LEVEL_HPA};
///
/// assert!(pressure_to_altitude_ft(1013.25, DEFAULT_SEA_LEVEL_HPA).abs() < 0.01);
/// assert!(pressure_to_altitude_ft(900.0, DEFAULT_SEA_LEVEL_HPA) > 3000.0);
/// ```
#[must_use]
pub fn pressure_to_altitude_ft(pressure_hpa: f32, sea_level_hpa: f32) -> f32 {
    44330.0 * FEET_PER_METER * (1.0 - (pressure_hpa / sea_level_hpa).powf(0.1903))
}

/// Tuning for the deployment state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoverySettings {
    pub update_interval_ms: u64,
    pub descent_streak: u16,
    pub deploy_altitude_ft: f32,
    pub sea_level_hpa: f32,
    pub stowed_angle: u8,
    pub deployed_angle: u8,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 1000,
            descent_streak: 10,
            deploy_altitude_ft: 500.0,
            sea_level_hpa: DEFAULT_SEA_LEVEL_HPA,
            stowed_angle: 45,
            deployed_angle: 135,
        }
    }
}

impl From<&RecoveryConfig> for RecoverySettings {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            update_interval_ms: config.update_interval_ms,
            descent_streak: config.descent_streak,
            deploy_altitude_ft: config.deploy_altitude_ft,
            sea_level_hpa: config.sea_level_hpa,
            stowed_angle: config.stowed_angle,
            deployed_angle: config.deployed_angle,
        }
    }
}

/// Mutable state of the deployment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeploymentState {
    pub has_deployed: bool,
    /// Ground baseline in feet
    pub start_altitude_ft: f32,
    /// Previous relative altitude in feet
    pub last_altitude_ft: f32,
    pub descent_streak: u16,
    pub last_update_ms: Option<u64>,
}

/// Altitude-trend state machine owning the recovery actuator.
#[derive(Debug)]
pub struct RecoveryDeploymentController<A: Actuator> {
    settings: RecoverySettings,
    state: DeploymentState,
    actuator: A,
}

impl<A: Actuator> RecoveryDeploymentController<A> {
    pub fn new(settings: RecoverySettings, actuator: A) -> Self {
        Self {
            settings,
            state: DeploymentState::default(),
            actuator,
        }
    }

    /// Records the ground baseline and moves the actuator to the stowed position.
    ///
    /// # Arguments
    ///
    /// * `initial_pressure_pa` - Pressure on the pad in Pa
    pub fn setup(&mut self, initial_pressure_pa: f32) {
        self.state.start_altitude_ft = self.altitude_ft(initial_pressure_pa);
        self.actuator.set_position(self.settings.stowed_angle);
        info!(
            "Recovery armed: baseline {:.1} ft, deploy below {:.0} ft after {} descending samples",
            self.state.start_altitude_ft, self.settings.deploy_altitude_ft, self.settings.descent_streak
        );
    }

    /// Feeds one pressure reading; rate limited to the configured interval.
    ///
    /// # Arguments
    ///
    /// * `pressure_pa` - Current pressure in Pa
    /// * `_vertical_accel_mps2` - Vertical acceleration; accepted for the
    ///   collaborator contract, the altitude trend alone decides deployment
    /// * `now_ms` - Monotonic time
    ///
    /// # Returns
    ///
    /// `true` if this call deployed the parachute.
    pub fn update(&mut self, pressure_pa: f32, _vertical_accel_mps2: f32, now_ms: u64) -> bool {
        if self.state.has_deployed {
            return false;
        }

        if let Some(last) = self.state.last_update_ms {
            if now_ms.saturating_sub(last) < self.settings.update_interval_ms {
                return false;
            }
        }

        let relative = self.altitude_ft(pressure_pa) - self.state.start_altitude_ft;

        if self.state.descent_streak >= self.settings.descent_streak
            && relative < self.settings.deploy_altitude_ft
        {
            info!(
                "Deploying at {:.1} ft after {} descending samples",
                relative, self.state.descent_streak
            );
            return self.deploy_parachute();
        }

        if relative < self.state.last_altitude_ft {
            self.state.descent_streak = self.state.descent_streak.saturating_add(1);
        } else {
            self.state.descent_streak = self.state.descent_streak.saturating_sub(1);
        }
        debug!("Relative altitude {:.1} ft, descent streak {}", relative, self.state.descent_streak);

        self.state.last_altitude_ft = relative;
        self.state.last_update_ms = Some(now_ms);
        false
    }

    /// Sets the terminal flag and commands the deployed position.
    ///
    /// Idempotent: only the first call reaches the actuator.
    ///
    /// # Returns
    ///
    /// `true` if this call performed the deployment.
    pub fn deploy_parachute(&mut self) -> bool {
        if self.state.has_deployed {
            return false;
        }
        self.state.has_deployed = true;
        self.actuator.set_position(self.settings.deployed_angle);
        info!("Parachute deployed");
        true
    }

    #[must_use]
    pub fn has_deployed(&self) -> bool {
        self.state.has_deployed
    }

    #[must_use]
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    #[must_use]
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    fn altitude_ft(&self, pressure_pa: f32) -> f32 {
        pressure_to_altitude_ft(pressure_pa / 100.0, self.settings.sea_level_hpa)
    }
}
