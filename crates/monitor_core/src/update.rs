use monitor_logging::{monitor_debug, monitor_info, monitor_trace, monitor_warn};

use crate::retry::RetryDecision;
use crate::state::{ActiveRun, Phase};
use crate::{
    Effect, JobConfig, JobStatus, LatestResult, LiveMatch, MonitorEvent, MonitorState, Msg, RunId,
    Stream, Timer, TransportFailure,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: MonitorState, msg: Msg) -> (MonitorState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested(job) => start(&mut state, job),
        Msg::StopRequested => stop(&mut state),
        Msg::SubmissionAccepted { run } => submission_accepted(&mut state, run),
        Msg::SubmissionFailed { run, reason } => submission_failed(&mut state, run, reason),
        Msg::EstimatorTick { run } => estimator_tick(&mut state, run),
        Msg::PollDue { run, stream } => poll(&mut state, run, stream, None),
        Msg::RetryDue {
            run,
            stream,
            after_seq,
        } => poll(&mut state, run, stream, Some(after_seq)),
        Msg::StatusReceived { run, seq, status } => status_received(&mut state, run, seq, status),
        Msg::StatusFailed { run, seq, failure } => status_failed(&mut state, run, seq, failure),
        Msg::LiveMatchesReceived { run, seq, matches } => {
            live_matches_received(&mut state, run, seq, matches)
        }
        Msg::LiveMatchesFailed { run, seq, failure } => {
            live_matches_failed(&mut state, run, seq, failure)
        }
        Msg::LatestResultReceived { run, result } => latest_result_received(&mut state, run, result),
        Msg::LatestResultFailed { run, reason } => latest_result_failed(&mut state, run, reason),
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn start(state: &mut MonitorState, job: JobConfig) -> Vec<Effect> {
    if matches!(state.phase, Phase::Starting { .. } | Phase::Running(_)) {
        monitor_warn!("Start ignored: run {} is still active", state.last_run);
        return Vec::new();
    }

    let run = state.last_run + 1;
    state.last_run = run;
    state.reset_run_data();
    state.phase = Phase::Starting {
        run,
        job: job.clone(),
    };
    state.mark_dirty();
    monitor_info!(
        "Submitting run {} (time budget {}s)",
        run,
        job.optimization_time
    );
    vec![Effect::SubmitJob { run, config: job }]
}

fn stop(state: &mut MonitorState) -> Vec<Effect> {
    let mut effects = Vec::new();
    let run = match std::mem::take(&mut state.phase) {
        Phase::Idle => return effects,
        Phase::Running(active) => {
            effects.push(Effect::DisarmAll);
            active.run
        }
        Phase::Starting { run, .. } | Phase::Completed { run } | Phase::Failed { run } => run,
    };

    state.reset_run_data();
    state.mark_dirty();
    monitor_info!("Run {} stopped by user", run);
    effects.push(Effect::Notify(MonitorEvent::Stopped { run }));
    effects
}

fn submission_accepted(state: &mut MonitorState, run: RunId) -> Vec<Effect> {
    let job = match &state.phase {
        Phase::Starting { run: current, job } if *current == run => job.clone(),
        _ => {
            monitor_debug!("Discarding stale acceptance for run {}", run);
            return Vec::new();
        }
    };

    let total = state.config.estimated_duration_secs(job.optimization_time);
    state.estimator.start(total);
    state.phase = Phase::Running(ActiveRun::new(run, job));
    state.mark_dirty();
    monitor_info!("Run {} accepted, assuming {:.0}s total", run, total);

    vec![
        Effect::Arm {
            run,
            timer: Timer::Estimator,
            interval: state.config.estimator_interval(),
        },
        Effect::Arm {
            run,
            timer: Timer::Status,
            interval: state.config.status_interval(),
        },
        Effect::Notify(MonitorEvent::Started { run }),
    ]
}

fn submission_failed(state: &mut MonitorState, run: RunId, reason: String) -> Vec<Effect> {
    if !matches!(state.phase, Phase::Starting { run: current, .. } if current == run) {
        monitor_debug!("Discarding stale submission failure for run {}", run);
        return Vec::new();
    }

    monitor_warn!("Submission for run {} failed: {}", run, reason);
    state.phase = Phase::Idle;
    state.last_error = Some(reason.clone());
    state.mark_dirty();
    vec![Effect::Notify(MonitorEvent::SubmissionFailed { reason })]
}

fn estimator_tick(state: &mut MonitorState, run: RunId) -> Vec<Effect> {
    if state.active_run_mut(run).is_none() {
        monitor_trace!("Ignoring estimator tick for run {}", run);
        return Vec::new();
    }
    let moved = state.estimator.tick();
    state.mark_dirty();
    if moved {
        progress_advanced(state)
    } else {
        Vec::new()
    }
}

/// Issue the next request for `stream`. Retries carry the sequence number of
/// the failed request and are dropped when something newer was issued since.
fn poll(
    state: &mut MonitorState,
    run: RunId,
    stream: Stream,
    after_seq: Option<u64>,
) -> Vec<Effect> {
    let Some(active) = state.active_run_mut(run) else {
        monitor_trace!("Ignoring {:?} poll for run {}", stream, run);
        return Vec::new();
    };
    if stream == Stream::LiveMatches && !active.live_armed {
        monitor_trace!("Live matches not engaged yet for run {}", run);
        return Vec::new();
    }
    let tracker = active.tracker_mut(stream);
    if let Some(after_seq) = after_seq {
        if tracker.last_issued() != after_seq {
            monitor_trace!("{:?} retry superseded by request {}", stream, tracker.last_issued());
            return Vec::new();
        }
    }

    match tracker.begin() {
        Some(seq) => match stream {
            Stream::Status => vec![Effect::FetchStatus { run, seq }],
            Stream::LiveMatches => vec![Effect::FetchLiveMatches { run, seq }],
        },
        None => {
            monitor_debug!("{:?} request still outstanding, skipping tick", stream);
            Vec::new()
        }
    }
}

fn status_received(
    state: &mut MonitorState,
    run: RunId,
    seq: u64,
    status: JobStatus,
) -> Vec<Effect> {
    let Some(active) = state.active_run_mut(run) else {
        monitor_debug!("Discarding status for inactive run {}", run);
        return Vec::new();
    };
    if !active.status.settle(seq) {
        monitor_debug!("Discarding out-of-order status response {}", seq);
        return Vec::new();
    }
    active.status.retry.record_success();

    let mut effects = Vec::new();
    if std::mem::take(&mut state.degraded) {
        monitor_info!("Status channel recovered");
        effects.push(Effect::Notify(MonitorEvent::ConnectionRestored));
    }
    state.stage_name = status.stage.clone();
    state.message = status.message.clone();
    state.mark_dirty();

    if !status.is_running {
        effects.extend(finish(state, &status));
        return effects;
    }

    let moved = state.estimator.reconcile(status.progress);
    if let Some(remaining) = status.estimated_remaining_seconds {
        let tolerance = state.config.reestimate_tolerance_secs;
        if state.estimator.reestimate(remaining, tolerance) {
            monitor_debug!(
                "Re-planned estimate: {:.0}s total",
                state.estimator.assumed_total_secs()
            );
        }
    }
    if moved {
        effects.extend(progress_advanced(state));
    }
    effects
}

/// Leave the running phase on an authoritative `is_running == false`.
fn finish(state: &mut MonitorState, status: &JobStatus) -> Vec<Effect> {
    let active = match std::mem::take(&mut state.phase) {
        Phase::Running(active) => active,
        other => {
            state.phase = other;
            return Vec::new();
        }
    };
    let run = active.run;
    let mut effects = vec![Effect::DisarmAll];

    if status.progress >= 100.0 {
        state.estimator.complete();
        state.phase = Phase::Completed { run };
        monitor_info!("Run {} completed", run);
        effects.push(Effect::Notify(MonitorEvent::Completed { run }));
        effects.push(Effect::FetchLatestResult { run });
    } else {
        state.estimator.freeze();
        state.phase = Phase::Failed { run };
        let message = if status.message.is_empty() {
            format!("job stopped at {:.0}%", status.progress)
        } else {
            status.message.clone()
        };
        monitor_warn!("Run {} failed: {}", run, message);
        state.last_error = Some(message.clone());
        effects.push(Effect::Notify(MonitorEvent::Failed {
            run,
            progress: state.estimator.value(),
            message,
        }));
    }
    state.mark_dirty();
    effects
}

fn status_failed(
    state: &mut MonitorState,
    run: RunId,
    seq: u64,
    failure: TransportFailure,
) -> Vec<Effect> {
    let policy = state.config.status_retry;
    let Some(active) = state.active_run_mut(run) else {
        monitor_debug!("Discarding status failure for inactive run {}", run);
        return Vec::new();
    };
    if !active.status.settle(seq) {
        return Vec::new();
    }

    match active.status.retry.record_failure(&failure, &policy) {
        RetryDecision::RetryAfter(delay) => {
            monitor_warn!(
                "Status poll failed ({}), retrying in {:?}",
                failure.message,
                delay
            );
            vec![Effect::ScheduleRetry {
                run,
                stream: Stream::Status,
                after_seq: seq,
                delay,
            }]
        }
        RetryDecision::Exhausted => {
            let consecutive_failures = active.status.retry.consecutive_failures();
            if state.degraded {
                return Vec::new();
            }
            monitor_warn!(
                "Status channel degraded after {} failures: {}",
                consecutive_failures,
                failure.message
            );
            state.degraded = true;
            state.mark_dirty();
            vec![Effect::Notify(MonitorEvent::ConnectionDegraded {
                consecutive_failures,
                class: failure.class,
            })]
        }
    }
}

fn live_matches_received(
    state: &mut MonitorState,
    run: RunId,
    seq: u64,
    matches: Vec<LiveMatch>,
) -> Vec<Effect> {
    let Some(active) = state.active_run_mut(run) else {
        return Vec::new();
    };
    if !active.live.settle(seq) {
        return Vec::new();
    }
    active.live.retry.record_success();
    if state.live_matches != matches {
        state.live_matches = matches;
        state.mark_dirty();
    }
    Vec::new()
}

/// Live matches are advisory: failures never reach the lifecycle, the list
/// just empties once retries run out.
fn live_matches_failed(
    state: &mut MonitorState,
    run: RunId,
    seq: u64,
    failure: TransportFailure,
) -> Vec<Effect> {
    let policy = state.config.live_match_retry;
    let Some(active) = state.active_run_mut(run) else {
        return Vec::new();
    };
    if !active.live.settle(seq) {
        return Vec::new();
    }

    match active.live.retry.record_failure(&failure, &policy) {
        RetryDecision::RetryAfter(delay) => vec![Effect::ScheduleRetry {
            run,
            stream: Stream::LiveMatches,
            after_seq: seq,
            delay,
        }],
        RetryDecision::Exhausted => {
            monitor_debug!("Live matches unavailable: {}", failure.message);
            if !state.live_matches.is_empty() {
                state.live_matches.clear();
                state.mark_dirty();
            }
            Vec::new()
        }
    }
}

fn latest_result_received(state: &mut MonitorState, run: RunId, result: LatestResult) -> Vec<Effect> {
    if matches!(state.phase, Phase::Completed { run: current } if current == run) {
        monitor_info!(
            "Run {} result: {} allocations of {}",
            run,
            result.allocations.len(),
            result.total
        );
        state.latest_result = Some(result);
        state.mark_dirty();
    }
    Vec::new()
}

fn latest_result_failed(state: &mut MonitorState, run: RunId, reason: String) -> Vec<Effect> {
    if matches!(state.phase, Phase::Completed { run: current } if current == run) {
        monitor_warn!("Latest result for run {} unavailable: {}", run, reason);
        state.last_error = Some(reason);
        state.mark_dirty();
    }
    Vec::new()
}

/// Follow-up work whenever reconciled progress moved: milestones and the
/// live-match engagement threshold.
fn progress_advanced(state: &mut MonitorState) -> Vec<Effect> {
    let progress = state.estimator.value();
    let mut effects: Vec<Effect> = state
        .milestones
        .observe(progress)
        .into_iter()
        .map(|threshold| {
            monitor_info!("Milestone {}% reached", threshold);
            Effect::Notify(MonitorEvent::Milestone { threshold })
        })
        .collect();

    let threshold = state.config.live_match_threshold;
    let interval = state.config.live_match_interval();
    if let Phase::Running(active) = &mut state.phase {
        if !active.live_armed && progress > threshold {
            active.live_armed = true;
            monitor_debug!("Progress {:.1}% engages live matches", progress);
            effects.push(Effect::Arm {
                run: active.run,
                timer: Timer::LiveMatches,
                interval,
            });
        }
    }
    state.mark_dirty();
    effects
}
