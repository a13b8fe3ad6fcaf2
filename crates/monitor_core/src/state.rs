use crate::estimator::ProgressEstimator;
use crate::milestone::MilestoneNotifier;
use crate::retry::RetryState;
use crate::view_model::MonitorView;
use crate::{JobConfig, LatestResult, LiveMatch, MonitorConfig, RunId, Stream};

/// Observable lifecycle of the monitored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
}

/// Request bookkeeping for one polled stream: at most one request in flight,
/// identified by a sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct StreamTracker {
    next_seq: u64,
    in_flight: Option<u64>,
    pub(crate) retry: RetryState,
}

impl StreamTracker {
    /// Issue a new request sequence number, unless one is still outstanding.
    pub(crate) fn begin(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }
        self.next_seq += 1;
        self.in_flight = Some(self.next_seq);
        Some(self.next_seq)
    }

    /// Accept the response for `seq` if it is the outstanding request.
    pub(crate) fn settle(&mut self, seq: u64) -> bool {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn last_issued(&self) -> u64 {
        self.next_seq
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }
}

/// Everything that only exists while the job is running. Leaving the running
/// phase drops it, which is what makes teardown happen exactly once.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveRun {
    pub(crate) run: RunId,
    pub(crate) job: JobConfig,
    pub(crate) status: StreamTracker,
    pub(crate) live: StreamTracker,
    pub(crate) live_armed: bool,
}

impl ActiveRun {
    pub(crate) fn new(run: RunId, job: JobConfig) -> Self {
        Self {
            run,
            job,
            status: StreamTracker::default(),
            live: StreamTracker::default(),
            live_armed: false,
        }
    }

    pub(crate) fn tracker_mut(&mut self, stream: Stream) -> &mut StreamTracker {
        match stream {
            Stream::Status => &mut self.status,
            Stream::LiveMatches => &mut self.live,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Phase {
    #[default]
    Idle,
    Starting {
        run: RunId,
        job: JobConfig,
    },
    Running(ActiveRun),
    Completed {
        run: RunId,
    },
    Failed {
        run: RunId,
    },
}

/// The controller's state bundle. Only [`crate::update`] writes to it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorState {
    pub(crate) config: MonitorConfig,
    pub(crate) phase: Phase,
    pub(crate) last_run: RunId,
    pub(crate) estimator: ProgressEstimator,
    pub(crate) milestones: MilestoneNotifier,
    pub(crate) degraded: bool,
    pub(crate) stage_name: String,
    pub(crate) message: String,
    pub(crate) live_matches: Vec<LiveMatch>,
    pub(crate) latest_result: Option<LatestResult>,
    pub(crate) last_error: Option<String>,
    dirty: bool,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl MonitorState {
    pub fn new(config: MonitorConfig) -> Self {
        let estimator =
            ProgressEstimator::new(config.estimate_ceiling, config.estimator_interval());
        let milestones = MilestoneNotifier::new(&config.milestones, config.milestone_window);
        Self {
            config,
            phase: Phase::Idle,
            last_run: 0,
            estimator,
            milestones,
            degraded: false,
            stage_name: String::new(),
            message: String::new(),
            live_matches: Vec::new(),
            latest_result: None,
            last_error: None,
            dirty: false,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.phase {
            Phase::Idle => Lifecycle::Idle,
            Phase::Starting { .. } => Lifecycle::Starting,
            Phase::Running(_) => Lifecycle::Running,
            Phase::Completed { .. } => Lifecycle::Completed,
            Phase::Failed { .. } => Lifecycle::Failed,
        }
    }

    /// Run the current phase belongs to, if any.
    pub fn current_run(&self) -> Option<RunId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Starting { run, .. } | Phase::Completed { run } | Phase::Failed { run } => {
                Some(*run)
            }
            Phase::Running(active) => Some(active.run),
        }
    }

    /// Parameters of the run being submitted or monitored.
    pub fn current_job(&self) -> Option<&JobConfig> {
        match &self.phase {
            Phase::Starting { job, .. } => Some(job),
            Phase::Running(active) => Some(&active.job),
            _ => None,
        }
    }

    pub fn progress(&self) -> f64 {
        self.estimator.value()
    }

    pub fn is_connection_degraded(&self) -> bool {
        self.degraded
    }

    /// Whether the live-match timer has been armed for the current run.
    pub fn live_matches_engaged(&self) -> bool {
        matches!(&self.phase, Phase::Running(active) if active.live_armed)
    }

    /// Whether no poll request of `stream` is outstanding.
    pub fn stream_idle(&self, stream: Stream) -> bool {
        match &self.phase {
            Phase::Running(active) => match stream {
                Stream::Status => active.status.is_idle(),
                Stream::LiveMatches => active.live.is_idle(),
            },
            _ => true,
        }
    }

    pub fn view(&self) -> MonitorView {
        MonitorView {
            lifecycle: self.lifecycle(),
            run: self.current_run(),
            job: self.current_job().cloned(),
            progress: self.estimator.value(),
            stage_name: self.stage_name.clone(),
            message: self.message.clone(),
            live_matches: self.live_matches.clone(),
            connection_degraded: self.degraded,
            elapsed_secs: self.estimator.elapsed_secs(),
            estimated_total_secs: self.estimator.assumed_total_secs(),
            milestones_fired: self.milestones.fired().iter().copied().collect(),
            latest_result: self.latest_result.clone(),
            last_error: self.last_error.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything observable changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn active_run_mut(&mut self, run: RunId) -> Option<&mut ActiveRun> {
        match &mut self.phase {
            Phase::Running(active) if active.run == run => Some(active),
            _ => None,
        }
    }

    /// Forget everything owned by the previous run.
    pub(crate) fn reset_run_data(&mut self) {
        self.estimator.reset();
        self.milestones.clear();
        self.degraded = false;
        self.stage_name.clear();
        self.message.clear();
        self.live_matches.clear();
        self.latest_result = None;
        self.last_error = None;
    }
}
