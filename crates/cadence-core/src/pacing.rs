//! Best-effort fixed-rate frame pacing.
//!
//! The pacer remembers when the previous cycle boundary was crossed. Each
//! call to [`FramePacer::wait_for_next_step`] blocks the calling thread
//! until one step has elapsed since then (or returns at once if the cycle
//! overran), and reports the real elapsed time. Overload is not corrected
//! for: a slow cycle simply yields a longer delta.

use std::time::{Duration, Instant};

/// Errors raised when building a pacer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacingError {
    /// The rate is zero, negative, non-finite, or too small to express as
    /// a step duration.
    #[error("invalid tick rate {rate}: must be a positive, finite number of cycles per second")]
    InvalidRate {
        /// The rejected rate.
        rate: f64,
    },
}

/// Timing of one crossed cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    /// Real time since the previous boundary.
    pub delta: Duration,
    /// How long the pacer blocked before crossing this boundary.
    pub slept: Duration,
    /// Accumulated real time across all boundaries since the last reset.
    pub total: Duration,
}

impl CycleTiming {
    /// [`delta`](Self::delta) in floating-point seconds.
    pub fn delta_seconds(&self) -> f64 {
        self.delta.as_secs_f64()
    }

    /// [`total`](Self::total) in floating-point seconds.
    pub fn total_seconds(&self) -> f64 {
        self.total.as_secs_f64()
    }
}

/// Blocks a cycle until its target boundary.
#[derive(Debug, Clone)]
pub struct FramePacer {
    rate: f64,
    step: Duration,
    last: Instant,
    total: Duration,
}

impl FramePacer {
    /// Create a pacer targeting `rate` cycles per second. The first
    /// boundary is one step after creation (or after [`reset`](Self::reset)).
    ///
    /// # Errors
    ///
    /// Returns [`PacingError::InvalidRate`] for a rate that is not a
    /// positive finite number.
    pub fn new(rate: f64) -> Result<Self, PacingError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PacingError::InvalidRate { rate });
        }
        let step = Duration::try_from_secs_f64(rate.recip())
            .map_err(|_overflow| PacingError::InvalidRate { rate })?;
        Ok(Self {
            rate,
            step,
            last: Instant::now(),
            total: Duration::ZERO,
        })
    }

    /// Target cycles per second.
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Target duration of one cycle.
    pub const fn step(&self) -> Duration {
        self.step
    }

    /// Restart timing from now and clear the accumulated total.
    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.total = Duration::ZERO;
    }

    /// Block until the next boundary, then record it.
    pub fn wait_for_next_step(&mut self) -> CycleTiming {
        let now = Instant::now();
        let slept = self.last.checked_add(self.step).map_or(Duration::ZERO, |target| {
            let remaining = target.saturating_duration_since(now);
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
            remaining
        });

        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last);
        self.last = now;
        self.total = self.total.saturating_add(delta);
        CycleTiming {
            delta,
            slept,
            total: self.total,
        }
    }
}
