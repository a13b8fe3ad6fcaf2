use std::time::Duration;

use crate::{FailureClass, JobConfig, RunId, Stream};

/// Side effects requested by [`crate::update`]. The engine executes them and
/// reports back with [`crate::Msg`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SubmitJob { run: RunId, config: JobConfig },
    Arm { run: RunId, timer: Timer, interval: Duration },
    /// Cancel every armed timer and pending retry. Safe to repeat.
    DisarmAll,
    FetchStatus { run: RunId, seq: u64 },
    FetchLiveMatches { run: RunId, seq: u64 },
    /// Request another attempt after `delay` unless a newer request was issued
    /// in the meantime.
    ScheduleRetry {
        run: RunId,
        stream: Stream,
        after_seq: u64,
        delay: Duration,
    },
    FetchLatestResult { run: RunId },
    Notify(MonitorEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    Estimator,
    Status,
    LiveMatches,
}

/// Named notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Started { run: RunId },
    SubmissionFailed { reason: String },
    ConnectionDegraded {
        consecutive_failures: u32,
        class: FailureClass,
    },
    ConnectionRestored,
    Milestone { threshold: u8 },
    Completed { run: RunId },
    Failed {
        run: RunId,
        progress: f64,
        message: String,
    },
    Stopped { run: RunId },
}

impl MonitorEvent {
    pub fn name(&self) -> String {
        match self {
            MonitorEvent::Started { .. } => "started".to_string(),
            MonitorEvent::SubmissionFailed { .. } => "submission_failed".to_string(),
            MonitorEvent::ConnectionDegraded { .. } => "connection_degraded".to_string(),
            MonitorEvent::ConnectionRestored => "connection_restored".to_string(),
            MonitorEvent::Milestone { threshold } => format!("milestone_{threshold}"),
            MonitorEvent::Completed { .. } => "completed".to_string(),
            MonitorEvent::Failed { .. } => "failed".to_string(),
            MonitorEvent::Stopped { .. } => "stopped".to_string(),
        }
    }

    /// Whether the event ends a run from the user's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorEvent::SubmissionFailed { .. }
                | MonitorEvent::Completed { .. }
                | MonitorEvent::Failed { .. }
                | MonitorEvent::Stopped { .. }
        )
    }
}
