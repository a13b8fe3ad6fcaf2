//! Locally simulated progress between authoritative updates.
//!
//! The estimate climbs linearly so that it reaches the ceiling when the assumed
//! duration has elapsed, and is held there until the backend reports
//! completion. Authoritative values only ever raise it.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEstimator {
    value: f64,
    ceiling: f64,
    tick_secs: f64,
    increment: f64,
    assumed_total_secs: f64,
    elapsed_secs: f64,
    frozen: bool,
}

impl ProgressEstimator {
    pub fn new(ceiling: f64, tick: Duration) -> Self {
        Self {
            value: 0.0,
            ceiling: ceiling.clamp(0.0, 100.0),
            tick_secs: tick.as_secs_f64().max(f64::EPSILON),
            increment: 0.0,
            assumed_total_secs: 0.0,
            elapsed_secs: 0.0,
            frozen: true,
        }
    }

    /// Begin a fresh run expected to last `total_secs`.
    pub fn start(&mut self, total_secs: f64) {
        self.value = 0.0;
        self.elapsed_secs = 0.0;
        self.frozen = false;
        self.assumed_total_secs = total_secs.max(self.tick_secs);
        self.increment = self.ceiling / self.ticks_in(self.assumed_total_secs);
    }

    /// Advance by one tick. Returns whether the value moved.
    pub fn tick(&mut self) -> bool {
        if self.frozen {
            return false;
        }
        self.elapsed_secs += self.tick_secs;
        if self.value >= self.ceiling {
            return false;
        }
        let next = (self.value + self.increment).min(self.ceiling);
        let moved = next > self.value;
        self.value = next;
        moved
    }

    /// Raise the estimate to an authoritative value if it is higher.
    pub fn reconcile(&mut self, authoritative: f64) -> bool {
        if self.frozen {
            return false;
        }
        let authoritative = authoritative.clamp(0.0, 100.0);
        if authoritative > self.value {
            self.value = authoritative;
            return true;
        }
        false
    }

    /// Re-plan the remaining climb when the backend's remaining-time estimate
    /// implies a total duration far from the current assumption. The current
    /// value is kept.
    pub fn reestimate(&mut self, remaining_secs: f64, tolerance_secs: f64) -> bool {
        if self.frozen || !remaining_secs.is_finite() || remaining_secs < 0.0 {
            return false;
        }
        let implied_total = self.elapsed_secs + remaining_secs;
        if (implied_total - self.assumed_total_secs).abs() <= tolerance_secs {
            return false;
        }
        self.assumed_total_secs = implied_total;
        let headroom = (self.ceiling - self.value).max(0.0);
        self.increment = headroom / self.ticks_in(remaining_secs.max(self.tick_secs));
        true
    }

    /// Authoritative completion: pin to exactly 100 and stop moving.
    pub fn complete(&mut self) {
        self.value = 100.0;
        self.frozen = true;
    }

    /// Hold the last value, e.g. after a failed run.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.ceiling, Duration::from_secs_f64(self.tick_secs));
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn assumed_total_secs(&self) -> f64 {
        self.assumed_total_secs
    }

    pub fn increment(&self) -> f64 {
        self.increment
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ticks_in(&self, secs: f64) -> f64 {
        (secs / self.tick_secs).max(1.0)
    }
}
