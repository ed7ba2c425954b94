//! Scheduler Module
//!
//! Decides *whether* a probabilistic action fires (`sample() <= p`) and
//! *when* the next decision happens (`now + pick_window(min, max)`).
//!
//! Every call draws from its own freshly seeded generator, so monitors of
//! different entities never share random state.

use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Uniform sample in (0, 1]
#[must_use]
pub fn sample() -> f64 {
    let mut rng = StdRng::from_entropy();
    1.0 - rng.gen::<f64>()
}

/// True when an action with probability `probability` fires this time
#[inline]
#[must_use]
pub fn fires(probability: f64) -> bool {
    sample() <= probability
}

/// Uniform duration in `[min, max)`; exactly `min` for a degenerate window
#[must_use]
pub fn pick_window(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = StdRng::from_entropy();
    min + rng.gen_range(Duration::ZERO..max - min)
}

/// A randomized `[min, max]` dwell window in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DwellWindow {
    /// Lower bound
    pub min_ms: u64,
    /// Upper bound, inclusive
    pub max_ms: u64,
}

impl DwellWindow {
    /// Window in milliseconds
    #[inline]
    #[must_use]
    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Window in whole seconds
    #[inline]
    #[must_use]
    pub const fn from_secs(min_secs: u64, max_secs: u64) -> Self {
        Self::from_millis(min_secs * 1000, max_secs * 1000)
    }

    /// Window that always yields `duration`
    #[must_use]
    pub fn fixed(duration: Duration) -> Self {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self::from_millis(ms, ms)
    }

    /// Lower bound as a duration
    #[inline]
    #[must_use]
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    /// Upper bound as a duration
    #[inline]
    #[must_use]
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Draw a duration from this window
    #[must_use]
    pub fn pick(&self) -> Duration {
        pick_window(self.min(), self.max())
    }

    /// Reject reversed bounds
    ///
    /// # Errors
    /// `ConfigError::InvalidWindow` when `min > max`.
    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min_ms > self.max_ms {
            return Err(ConfigError::InvalidWindow {
                name,
                min: self.min(),
                max: self.max(),
            });
        }
        Ok(())
    }
}
