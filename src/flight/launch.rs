//! # Launch Detection Module
//!
//! Decides when the vehicle has launched and when it has landed from the
//! accelerometer history.
//!
//! ## Smoothing
//!
//! Every sample goes into a [`SampleWindow`] holding the last
//! [`WINDOW_SIZE`] readings. Detection is suppressed until the window has
//! filled once. After that, each axis is averaged over the window and launch
//! is declared when the squared magnitude of the averaged vector reaches
//! `(threshold_g * g)^2`. A single high-g sample is diluted by the other
//! readings and cannot trigger launch on its own.
//!
//! ## Landing
//!
//! Landing is a pure function of elapsed time since launch: by default
//! five minutes after launch the vehicle is considered on the ground.
//!
//! ## Usage
//!
//! ```
//! use flight_logger::flight::launch::{FlightStateEstimator, WINDOW_SIZE};
//! use flight_logger::hal::host::TracingIndicator;
//!
//! let mut estimator = FlightStateEstimator::default();
//! let mut indicator = TracingIndicator::new();
//!
//! for tick in 0..WINDOW_SIZE as u64 {
//!     estimator.update([0.0, 0.0, 50.0], tick * 100, &mut indicator);
//! }
//! assert!(estimator.launched());
//! ```

use tracing::{debug, info};

use crate::hal::Indicator;

/// Number of acceleration samples averaged for launch detection.
pub const WINDOW_SIZE: usize = 30;

/// Standard gravity in m/s^2 used for the launch threshold.
pub const STANDARD_GRAVITY: f32 = 9.8;

/// Default launch threshold in multiples of g.
pub const DEFAULT_LAUNCH_THRESHOLD_G: f32 = 4.0;

/// Default time from launch until the vehicle is considered landed.
pub const DEFAULT_LANDING_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Fixed-capacity circular buffer of the most recent acceleration triples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: [[f32; 3]; WINDOW_SIZE],
    position: usize,
    full: bool,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self {
            samples: [[0.0; 3]; WINDOW_SIZE],
            position: 0,
            full: false,
        }
    }
}

impl SampleWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a sample at the current position and advances modulo the capacity.
    pub fn push(&mut self, sample: [f32; 3]) {
        self.samples[self.position] = sample;
        self.position += 1;
        if self.position >= WINDOW_SIZE {
            self.full = true;
            self.position = 0;
        }
    }

    /// Whether the window has been filled at least once.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Number of valid samples currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.full {
            WINDOW_SIZE
        } else {
            self.position
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-axis arithmetic mean over the whole window.
    #[must_use]
    pub fn mean(&self) -> [f32; 3] {
        let mut sum = [0.0f32; 3];
        for sample in &self.samples {
            for (acc, value) in sum.iter_mut().zip(sample) {
                *acc += value;
            }
        }
        sum.map(|axis| axis / WINDOW_SIZE as f32)
    }
}

/// Launch/landing estimator fed once per logging tick.
#[derive(Debug, Clone)]
pub struct FlightStateEstimator {
    window: SampleWindow,
    threshold_squared: f32,
    landing_timeout_ms: u64,
    launch_timestamp: Option<u64>,
}

impl Default for FlightStateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_LAUNCH_THRESHOLD_G, DEFAULT_LANDING_TIMEOUT_MS)
    }
}

impl FlightStateEstimator {
    /// Creates an estimator.
    ///
    /// # Arguments
    ///
    /// * `threshold_g` - Sustained average acceleration (in g) that counts as launch
    /// * `landing_timeout_ms` - Time after launch at which the flight is over
    #[must_use]
    pub fn new(threshold_g: f32, landing_timeout_ms: u64) -> Self {
        let threshold = threshold_g * STANDARD_GRAVITY;
        Self {
            window: SampleWindow::new(),
            threshold_squared: threshold * threshold,
            landing_timeout_ms,
            launch_timestamp: None,
        }
    }

    /// Feeds one acceleration reading in m/s^2.
    ///
    /// No-op once launched; the window is frozen from then on. When launch is
    /// declared the timestamp is recorded and the indicator is triggered.
    ///
    /// # Returns
    ///
    /// `true` if this call declared launch.
    pub fn update<I: Indicator + ?Sized>(
        &mut self,
        accel: [f32; 3],
        now_ms: u64,
        indicator: &mut I,
    ) -> bool {
        if self.launched() {
            return false;
        }

        self.window.push(accel);
        if !self.window.is_full() {
            return false;
        }

        let [x, y, z] = self.window.mean();
        let magnitude_squared = x * x + y * y + z * z;

        if magnitude_squared >= self.threshold_squared {
            self.launch_timestamp = Some(now_ms);
            info!(
                "Launch detected at {} ms (avg {:.1} m/s^2)",
                now_ms,
                magnitude_squared.sqrt()
            );
            indicator.launch_detected();
            return true;
        }

        debug!("Window average {:.2} m/s^2, waiting for launch", magnitude_squared.sqrt());
        false
    }

    #[must_use]
    pub fn launched(&self) -> bool {
        self.launch_timestamp.is_some()
    }

    /// Time launch was declared, if it has been.
    #[must_use]
    pub fn launch_timestamp(&self) -> Option<u64> {
        self.launch_timestamp
    }

    /// True iff launched and at least the landing timeout has elapsed since.
    #[must_use]
    pub fn has_landed(&self, now_ms: u64) -> bool {
        match self.launch_timestamp {
            Some(launched_at) => now_ms.saturating_sub(launched_at) >= self.landing_timeout_ms,
            None => false,
        }
    }

    #[must_use]
    pub fn window(&self) -> &SampleWindow {
        &self.window
    }
}
