//! Special ambient event scheduling
//!
//! Picks a pseudo-random delay in the configured window for the next special
//! interlude, with a fixed backoff when the machine was busy at trigger time.

use rand::Rng;
use std::time::Duration;

use crate::config::SpecialEventConfig;

/// Delay source for special-event triggers
#[derive(Debug, Clone)]
pub struct SpecialEventTimer {
    min: Duration,
    max: Duration,
    backoff: Duration,
}

impl SpecialEventTimer {
    pub fn new(config: &SpecialEventConfig) -> Self {
        let min = Duration::from_secs(config.min_interval_secs);
        // A window with max <= min collapses to the fixed min delay.
        let max = Duration::from_secs(config.max_interval_secs.max(config.min_interval_secs));
        Self {
            min,
            max,
            backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }

    /// Random delay in [min, max] for the next trigger.
    pub fn next_delay(&self) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs()..=self.max.as_secs());
        Duration::from_secs(secs)
    }

    /// Fixed retry delay used when the previous trigger found the machine busy.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff
    }
}
