//! # Flight Computer
//!
//! The single cooperative control loop tying the estimator, the recovery
//! controller and the log engine together.
//!
//! ## Lifecycle
//!
//! 1. [`boot`] brings the sensors up and opens the log. Either failing is a
//!    halt, except that holding the erase combination while the log cannot be
//!    opened removes the file instead.
//! 2. [`FlightComputer::start_session`] writes one unconditional baseline
//!    record per channel, arms the recovery actuator and flushes.
//! 3. [`FlightComputer::tick`] is called as often as the driver likes; the
//!    rate limiters inside decide what work each call does.
//!
//! ## Per tick
//!
//! ```text
//! pump staging -> (every update interval) read sensors -> launch estimator
//!   -> recovery controller -> delta encoder -> (every flush interval, if dirty) flush
//! ```
//!
//! Value records are only produced between launch and landing. Any fatal
//! storage error turns the loop into [`LoopStatus::Halted`] for good.

use tracing::{debug, error, info, warn};

use crate::config::{Config, SinkMode};
use crate::error::{FlightLoggerError, HaltReason, Result};
use crate::flight::launch::FlightStateEstimator;
use crate::flight::recovery::{RecoveryDeploymentController, RecoverySettings};
use crate::hal::{Actuator, Indicator, SensorFrame, SensorSource};
use crate::telemetry::channel::{standard_readings, ChannelRegistry};
use crate::telemetry::encoder::DeltaLogEncoder;
use crate::telemetry::sink::{DirectWriter, RecordSink, SinkStats, StagedWriter};
use crate::telemetry::storage::{open_log, Storage};

/// What the loop is doing after a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStatus {
    /// Waiting on the pad for launch
    Idle,
    /// Between launch and landing, logging changed channels
    Recording,
    /// Flight over, nothing more is logged
    Landed,
    /// Stopped for good
    Halted(HaltReason),
}

/// Build the sink selected by the logging configuration around `storage`.
pub fn build_sink<S: Storage + 'static>(config: &Config, storage: S) -> Box<dyn RecordSink> {
    match config.logging.mode {
        SinkMode::Direct => Box::new(DirectWriter::new(storage)),
        SinkMode::Staged => Box::new(StagedWriter::new(
            storage,
            config.logging.staging_capacity_bytes,
        )),
    }
}

/// Bring up sensors and storage, returning a computer ready for its session.
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `sensors` - Sensor collaborator; `begin` is called once
/// * `actuator` - Recovery actuator
/// * `indicator` - Tone/LED collaborator
/// * `erase_requested` - Operator is holding the boot-time erase combination
///
/// # Errors
///
/// The [`HaltReason`] the loop should stop with.
pub fn boot<S, A, I>(
    config: &Config,
    sensors: &mut S,
    actuator: A,
    indicator: I,
    erase_requested: bool,
) -> std::result::Result<FlightComputer<A, I>, HaltReason>
where
    S: SensorSource + ?Sized,
    A: Actuator,
    I: Indicator,
{
    if let Err(e) = sensors.begin() {
        error!("Sensor startup failed: {}", e);
        return Err(HaltReason::SensorInit(e.to_string()));
    }

    let storage = open_log(
        &config.logging.path,
        config.logging.write_window_bytes,
        erase_requested,
    )?;
    let sink = build_sink(config, storage);
    Ok(FlightComputer::new(config, sink, actuator, indicator))
}

/// Owner of all per-session flight and logging state
pub struct FlightComputer<A: Actuator, I: Indicator> {
    registry: ChannelRegistry,
    estimator: FlightStateEstimator,
    recovery: RecoveryDeploymentController<A>,
    recovery_enabled: bool,
    arm_on_launch: bool,
    encoder: DeltaLogEncoder,
    sink: Box<dyn RecordSink>,
    indicator: I,
    update_interval_ms: u64,
    flush_interval_ms: u64,
    last_update_ms: Option<u64>,
    last_flush_ms: u64,
    dirty: bool,
    landed_reported: bool,
    halted: Option<HaltReason>,
}

impl<A: Actuator, I: Indicator> FlightComputer<A, I> {
    /// Assemble a computer around an already opened sink.
    pub fn new(config: &Config, sink: Box<dyn RecordSink>, actuator: A, indicator: I) -> Self {
        Self {
            registry: ChannelRegistry::standard(),
            estimator: FlightStateEstimator::new(
                config.flight.launch_threshold_g,
                config.flight.landing_timeout_s * 1000,
            ),
            recovery: RecoveryDeploymentController::new(
                RecoverySettings::from(&config.recovery),
                actuator,
            ),
            recovery_enabled: config.recovery.enabled,
            arm_on_launch: config.recovery.arm_on_launch,
            encoder: DeltaLogEncoder::new(),
            sink,
            indicator,
            update_interval_ms: config.logging.update_interval_ms,
            flush_interval_ms: config.logging.flush_interval_ms,
            last_update_ms: None,
            last_flush_ms: 0,
            dirty: false,
            landed_reported: false,
            halted: None,
        }
    }

    /// Write the baseline log, arm recovery and flush.
    ///
    /// # Returns
    ///
    /// [`LoopStatus::Idle`] on success, otherwise the halt it ended in.
    pub fn start_session<S: SensorSource + ?Sized>(&mut self, sensors: &mut S, now_ms: u64) -> LoopStatus {
        if let Some(reason) = &self.halted {
            return LoopStatus::Halted(reason.clone());
        }
        self.indicator.logging_armed();

        let frame = match sensors.read() {
            Ok(frame) => frame,
            Err(e) => return self.halt(HaltReason::SensorInit(e.to_string())),
        };

        if let Err(e) = self.write_baseline(&frame, now_ms) {
            return self.fail(e);
        }
        if self.recovery_enabled {
            self.recovery.setup(frame.pressure_pa);
        }
        info!("Session started at {} ms", now_ms);
        LoopStatus::Idle
    }

    /// Run one pass of the control loop.
    pub fn tick<S: SensorSource + ?Sized>(&mut self, sensors: &mut S, now_ms: u64) -> LoopStatus {
        if let Some(reason) = &self.halted {
            return LoopStatus::Halted(reason.clone());
        }
        if let Err(e) = self.step(sensors, now_ms) {
            return self.fail(e);
        }
        self.status(now_ms)
    }

    /// Drain and flush whatever is pending, e.g. on shutdown.
    ///
    /// # Errors
    ///
    /// Fatal sink errors.
    pub fn finish(&mut self) -> Result<()> {
        if self.halted.is_some() {
            return Ok(());
        }
        self.sink.flush()?;
        self.dirty = false;
        Ok(())
    }

    /// One pulse of the halt pattern.
    pub fn pulse_fault(&mut self) {
        self.indicator.fault_pulse();
    }

    /// Status as of `now_ms` without doing any work.
    #[must_use]
    pub fn status(&self, now_ms: u64) -> LoopStatus {
        if let Some(reason) = &self.halted {
            LoopStatus::Halted(reason.clone())
        } else if !self.estimator.launched() {
            LoopStatus::Idle
        } else if self.estimator.has_landed(now_ms) {
            LoopStatus::Landed
        } else {
            LoopStatus::Recording
        }
    }

    pub fn estimator(&self) -> &FlightStateEstimator {
        &self.estimator
    }

    pub fn recovery(&self) -> &RecoveryDeploymentController<A> {
        &self.recovery
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn sink_stats(&self) -> SinkStats {
        self.sink.stats()
    }

    fn write_baseline(&mut self, frame: &SensorFrame, now_ms: u64) -> Result<()> {
        let readings = standard_readings(frame);
        let count = self.encoder.log_readings(
            &mut self.registry,
            &readings,
            now_ms,
            true,
            self.sink.as_mut(),
        )?;
        debug!("Baseline of {} channels written", count);
        self.sink.flush()?;
        self.last_flush_ms = now_ms;
        self.dirty = false;
        Ok(())
    }

    fn step<S: SensorSource + ?Sized>(&mut self, sensors: &mut S, now_ms: u64) -> Result<()> {
        self.sink.pump()?;

        if self.update_due(now_ms) {
            self.last_update_ms = Some(now_ms);
            match sensors.read() {
                Ok(frame) => self.process_frame(&frame, now_ms)?,
                Err(e) => warn!("Skipping tick at {} ms: {}", now_ms, e),
            }
        }

        if self.dirty && now_ms.saturating_sub(self.last_flush_ms) > self.flush_interval_ms {
            self.sink.flush()?;
            self.dirty = false;
            self.last_flush_ms = now_ms;
        }
        Ok(())
    }

    fn update_due(&self, now_ms: u64) -> bool {
        match self.last_update_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.update_interval_ms,
            None => true,
        }
    }

    fn process_frame(&mut self, frame: &SensorFrame, now_ms: u64) -> Result<()> {
        self.estimator.update(frame.accel_mps2, now_ms, &mut self.indicator);

        let launched = self.estimator.launched();
        let landed = self.estimator.has_landed(now_ms);

        if self.recovery_enabled && !landed && (launched || !self.arm_on_launch) {
            self.recovery.update(frame.pressure_pa, frame.accel_mps2[2], now_ms);
        }

        if landed {
            if !self.landed_reported {
                info!("Landed at {} ms, logging stopped", now_ms);
                self.landed_reported = true;
            }
            return Ok(());
        }
        if !launched {
            return Ok(());
        }

        let readings = standard_readings(frame);
        let records_before = self.sink.stats().records;
        self.encoder.log_readings(
            &mut self.registry,
            &readings,
            now_ms,
            false,
            self.sink.as_mut(),
        )?;
        // A quiet tick can still land the timestamp of an earlier one
        if self.sink.stats().records != records_before {
            self.dirty = true;
        }
        Ok(())
    }

    fn fail(&mut self, e: FlightLoggerError) -> LoopStatus {
        self.halt(HaltReason::StorageFailure(e.to_string()))
    }

    fn halt(&mut self, reason: HaltReason) -> LoopStatus {
        error!("Halting: {}", reason);
        self.halted = Some(reason.clone());
        LoopStatus::Halted(reason)
    }
}
