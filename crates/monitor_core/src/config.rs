use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RetryPolicy;

/// Tunables for the controller. Every field has a default so partial config
/// files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub status_interval_ms: u64,
    pub live_match_interval_ms: u64,
    pub estimator_interval_ms: u64,
    /// Upper bound for simulated progress until the backend confirms completion.
    pub estimate_ceiling: f64,
    /// Added to the job's time budget to get the assumed total duration.
    pub processing_buffer_secs: u64,
    /// Revised durations closer than this to the current assumption are ignored.
    pub reestimate_tolerance_secs: f64,
    /// Live-match polling is armed once progress exceeds this value.
    pub live_match_threshold: f64,
    pub milestones: Vec<u8>,
    pub milestone_window: f64,
    pub status_retry: RetryPolicy,
    pub live_match_retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 2000,
            live_match_interval_ms: 3000,
            estimator_interval_ms: 500,
            estimate_ceiling: 90.0,
            processing_buffer_secs: 30,
            reestimate_tolerance_secs: 10.0,
            live_match_threshold: 10.0,
            milestones: vec![25, 50, 75],
            milestone_window: 5.0,
            status_retry: RetryPolicy::default(),
            live_match_retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn live_match_interval(&self) -> Duration {
        Duration::from_millis(self.live_match_interval_ms)
    }

    pub fn estimator_interval(&self) -> Duration {
        Duration::from_millis(self.estimator_interval_ms)
    }

    /// Assumed wall-clock duration of a job with the given time budget.
    pub fn estimated_duration_secs(&self, optimization_time: u64) -> f64 {
        optimization_time.saturating_add(self.processing_buffer_secs) as f64
    }
}
