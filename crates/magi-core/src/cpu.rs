//! CPU load estimation from in-process signals.
//!
//! No OS counters are read. Two indirect signals stand in for utilisation:
//!
//! - **frame-rate degradation**: frames rendered per second against a 60 fps
//!   target. A busy host drops frames.
//! - **scheduler-yield latency**: how long a low-priority callback waited
//!   beyond its 1 ms minimum. A busy host runs it late.
//!
//! The weighting below is a heuristic policy, not a measurement contract.

use crate::smoothing::{clamp, ema, sanitize};

/// Frame rate treated as "fully idle".
pub const TARGET_FPS: f64 = 60.0;
/// Expected minimum delay of an idle callback, subtracted from measurements.
pub const IDLE_MIN_DELAY_MS: f64 = 1.0;
/// Delay at which the latency factor saturates.
pub const IDLE_SATURATION_MS: f64 = 50.0;
/// Default smoothing factor.
pub const DEFAULT_ALPHA: f64 = 0.3;

const FRAME_WEIGHT: f64 = 30.0;
const DELAY_WEIGHT: f64 = 70.0;

/// Inputs for one estimation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    /// Monotonic time of this tick in milliseconds.
    pub now_ms: f64,
    /// Frames rendered since the previous tick; `None` on a headless host.
    pub frames: Option<u64>,
    /// Most recent idle-callback latency; `None` when the facility is absent.
    pub idle_delay_ms: Option<f64>,
}

/// Smoothed CPU utilisation estimator.
#[derive(Debug, Clone)]
pub struct CpuEstimator {
    alpha: f64,
    last_tick_ms: Option<f64>,
    last_raw: f64,
    smoothed: f64,
    samples: u64,
}

impl Default for CpuEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl CpuEstimator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            last_tick_ms: None,
            last_raw: 0.0,
            smoothed: 0.0,
            samples: 0,
        }
    }

    /// Fold one tick into the estimate and return the rounded percentage.
    pub fn sample(&mut self, input: CpuSample) -> u8 {
        let elapsed_ms = match self.last_tick_ms {
            Some(prev) => input.now_ms - prev,
            None => 0.0,
        };
        self.last_tick_ms = Some(input.now_ms);

        let frame_rate = observed_frame_rate(input.frames, elapsed_ms);
        let raw = match input.idle_delay_ms {
            Some(delay) => combined_usage(frame_rate, delay),
            None => frame_rate_usage(frame_rate),
        };

        self.last_raw = raw;
        self.smoothed = ema(self.smoothed, raw, self.alpha).round();
        self.samples += 1;
        self.current()
    }

    pub fn current(&self) -> u8 {
        clamp(self.smoothed, 0.0, 100.0) as u8
    }

    pub fn last_raw(&self) -> f64 {
        self.last_raw
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Frames per second over the elapsed window.
///
/// A headless host (no frame source) counts as running at the target rate.
/// The first tick has no window yet and also counts as the target rate.
fn observed_frame_rate(frames: Option<u64>, elapsed_ms: f64) -> f64 {
    match frames {
        None => TARGET_FPS,
        Some(_) if elapsed_ms <= 0.0 => TARGET_FPS,
        Some(n) => sanitize(n as f64 / (elapsed_ms / 1000.0)),
    }
}

/// Frame-rate and latency blend used when the idle facility exists.
pub fn combined_usage(frame_rate: f64, idle_delay_ms: f64) -> f64 {
    if frame_rate <= 0.0 {
        return 0.0;
    }
    let frame_factor = (1.0 - frame_rate / TARGET_FPS).max(0.0);
    let delay = sanitize(idle_delay_ms - IDLE_MIN_DELAY_MS);
    let delay_factor = (delay / IDLE_SATURATION_MS).min(1.0);
    (frame_factor * FRAME_WEIGHT + delay_factor * DELAY_WEIGHT).min(100.0)
}

/// Frame-rate-only fallback.
pub fn frame_rate_usage(frame_rate: f64) -> f64 {
    clamp((1.0 - frame_rate / TARGET_FPS) * 100.0, 0.0, 100.0)
}
