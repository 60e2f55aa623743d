//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{FlightLoggerError, Result};
use crate::telemetry::record::{TIMESTAMP_RECORD_SIZE, VALUE_RECORD_SIZE};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub flight: FlightConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Launch/landing detection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FlightConfig {
    #[serde(default = "default_launch_threshold_g")]
    pub launch_threshold_g: f32,

    #[serde(default = "default_landing_timeout_s")]
    pub landing_timeout_s: u64,
}

/// Recovery deployment configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_enabled")]
    pub enabled: bool,

    #[serde(default = "default_recovery_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_descent_streak")]
    pub descent_streak: u16,

    #[serde(default = "default_deploy_altitude_ft")]
    pub deploy_altitude_ft: f32,

    #[serde(default = "default_sea_level_hpa")]
    pub sea_level_hpa: f32,

    #[serde(default = "default_stowed_angle")]
    pub stowed_angle: u8,

    #[serde(default = "default_deployed_angle")]
    pub deployed_angle: u8,

    #[serde(default = "default_arm_on_launch")]
    pub arm_on_launch: bool,
}

/// Telemetry log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_path")]
    pub path: String,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_mode")]
    pub mode: SinkMode,

    #[serde(default = "default_staging_capacity_bytes")]
    pub staging_capacity_bytes: usize,

    #[serde(default = "default_write_window_bytes")]
    pub write_window_bytes: usize,
}

/// Diagnostic (tracing) output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file_logging: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Host-side replay configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReplayConfig {
    #[serde(default)]
    pub realtime: bool,
}

// Default value functions
fn default_launch_threshold_g() -> f32 { 4.0 }
fn default_landing_timeout_s() -> u64 { 300 }

fn default_recovery_enabled() -> bool { true }
fn default_recovery_interval_ms() -> u64 { 1000 }
fn default_descent_streak() -> u16 { 10 }
fn default_deploy_altitude_ft() -> f32 { 500.0 }
fn default_sea_level_hpa() -> f32 { 1013.25 }
fn default_stowed_angle() -> u8 { 45 }
fn default_deployed_angle() -> u8 { 135 }
fn default_arm_on_launch() -> bool { true }

fn default_log_path() -> String { "data.log".to_string() }
fn default_update_interval_ms() -> u64 { 100 }
fn default_flush_interval_ms() -> u64 { 1000 }
fn default_mode() -> SinkMode { SinkMode::Direct }
fn default_staging_capacity_bytes() -> usize { 1200 }
fn default_write_window_bytes() -> usize { 512 }

fn default_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            launch_threshold_g: default_launch_threshold_g(),
            landing_timeout_s: default_landing_timeout_s(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_recovery_enabled(),
            update_interval_ms: default_recovery_interval_ms(),
            descent_streak: default_descent_streak(),
            deploy_altitude_ft: default_deploy_altitude_ft(),
            sea_level_hpa: default_sea_level_hpa(),
            stowed_angle: default_stowed_angle(),
            deployed_angle: default_deployed_angle(),
            arm_on_launch: default_arm_on_launch(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            update_interval_ms: default_update_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            mode: default_mode(),
            staging_capacity_bytes: default_staging_capacity_bytes(),
            write_window_bytes: default_write_window_bytes(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging: false,
            log_dir: default_log_dir(),
        }
    }
}

/// How records travel from the encoder to storage
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// Every record is written straight to storage with rollback on shortfall
    Direct,
    /// Records are staged in a ring and drained as storage becomes ready
    Staged,
}

fn invalid(msg: impl std::fmt::Display) -> FlightLoggerError {
    FlightLoggerError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if !(1.0..=20.0).contains(&self.flight.launch_threshold_g) {
            return Err(invalid("launch_threshold_g must be between 1.0 and 20.0"));
        }

        if self.flight.landing_timeout_s == 0 || self.flight.landing_timeout_s > 3600 {
            return Err(invalid("landing_timeout_s must be between 1 and 3600"));
        }

        // Recovery timing and hysteresis
        if self.recovery.update_interval_ms == 0 || self.recovery.update_interval_ms > 60000 {
            return Err(invalid("recovery update_interval_ms must be between 1 and 60000"));
        }

        if self.recovery.descent_streak == 0 || self.recovery.descent_streak > 255 {
            return Err(invalid("descent_streak must be between 1 and 255"));
        }

        if self.recovery.deploy_altitude_ft <= 0.0 {
            return Err(invalid("deploy_altitude_ft must be greater than 0"));
        }

        if !(800.0..=1100.0).contains(&self.recovery.sea_level_hpa) {
            return Err(invalid("sea_level_hpa must be between 800 and 1100"));
        }

        if self.recovery.stowed_angle > 180 || self.recovery.deployed_angle > 180 {
            return Err(invalid("servo angles must be between 0 and 180"));
        }

        if self.recovery.stowed_angle == self.recovery.deployed_angle {
            return Err(invalid("stowed_angle and deployed_angle must differ"));
        }

        // Log destination and cadence
        if self.logging.path.is_empty() {
            return Err(invalid("logging path cannot be empty"));
        }

        if self.logging.update_interval_ms == 0 || self.logging.update_interval_ms > 60000 {
            return Err(invalid("logging update_interval_ms must be between 1 and 60000"));
        }

        if self.logging.flush_interval_ms == 0 || self.logging.flush_interval_ms > 60000 {
            return Err(invalid("flush_interval_ms must be between 1 and 60000"));
        }

        if self.logging.staging_capacity_bytes < TIMESTAMP_RECORD_SIZE {
            return Err(invalid("staging_capacity_bytes must hold at least one timestamp record (8 bytes)"));
        }

        if self.logging.write_window_bytes < VALUE_RECORD_SIZE {
            return Err(invalid("write_window_bytes must hold at least one value record (4 bytes)"));
        }

        // The staged writer only drains whole records
        if self.logging.mode == SinkMode::Staged && self.logging.write_window_bytes < TIMESTAMP_RECORD_SIZE {
            return Err(invalid("write_window_bytes must hold a timestamp record (8 bytes) in staged mode"));
        }

        if self.diagnostics.file_logging && self.diagnostics.log_dir.is_empty() {
            return Err(invalid("diagnostics log_dir cannot be empty when file_logging is enabled"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.diagnostics.level.as_str()) {
            return Err(invalid("diagnostics level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
