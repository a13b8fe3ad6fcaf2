use crate::{JobConfig, LatestResult, Lifecycle, LiveMatch, RunId};

/// Snapshot of everything the presentation layer may show.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitorView {
    pub lifecycle: Lifecycle,
    pub run: Option<RunId>,
    pub job: Option<JobConfig>,
    /// Reconciled progress in `[0, 100]`, never decreasing within a run.
    pub progress: f64,
    pub stage_name: String,
    pub message: String,
    pub live_matches: Vec<LiveMatch>,
    pub connection_degraded: bool,
    pub elapsed_secs: f64,
    pub estimated_total_secs: f64,
    pub milestones_fired: Vec<u8>,
    pub latest_result: Option<LatestResult>,
    pub last_error: Option<String>,
    pub dirty: bool,
}

impl MonitorView {
    /// Progress rounded for display.
    pub fn progress_percent(&self) -> u8 {
        self.progress.clamp(0.0, 100.0).floor() as u8
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Starting | Lifecycle::Running)
    }
}
