use std::sync::Once;
use std::time::Duration;

use monitor_core::{
    update, Effect, JobConfig, JobStatus, Lifecycle, MonitorConfig, MonitorEvent, MonitorState,
    Msg, RunId, Stream, Timer,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

fn running_with(config: MonitorConfig, job: JobConfig) -> (MonitorState, RunId) {
    let (state, _) = update(MonitorState::new(config), Msg::StartRequested(job));
    let (state, _) = update(state, Msg::SubmissionAccepted { run: 1 });
    (state, 1)
}

fn running() -> (MonitorState, RunId) {
    running_with(MonitorConfig::default(), JobConfig::default())
}

fn poll_status(state: MonitorState, run: RunId, status: JobStatus) -> (MonitorState, Vec<Effect>) {
    let (state, effects) = update(
        state,
        Msg::PollDue {
            run,
            stream: Stream::Status,
        },
    );
    let seq = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::FetchStatus { seq, .. } => Some(*seq),
            _ => None,
        })
        .expect("status fetch issued");
    update(state, Msg::StatusReceived { run, seq, status })
}

fn tick(mut state: MonitorState, run: RunId, times: usize) -> (MonitorState, Vec<Effect>) {
    let mut all = Vec::new();
    for _ in 0..times {
        let (next, effects) = update(state, Msg::EstimatorTick { run });
        state = next;
        all.extend(effects);
    }
    (state, all)
}

fn milestone_events(effects: &[Effect]) -> Vec<u8> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Notify(MonitorEvent::Milestone { threshold }) => Some(*threshold),
            _ => None,
        })
        .collect()
}

#[test]
fn displayed_progress_never_decreases() {
    init_logging();
    let (mut state, run) = running();
    let reports = [5.0, 30.0, 20.0, 45.0, 10.0, 60.0, 60.0, 55.0, 0.0, 88.0, 70.0];
    let mut last = state.progress();

    for report in reports {
        let (next, _) = tick(state, run, 3);
        assert!(next.progress() >= last);
        last = next.progress();

        let (next, _) = poll_status(next, run, JobStatus::running(report));
        assert!(next.progress() >= last, "{} fell below {}", next.progress(), last);
        assert!(next.progress() >= report);
        last = next.progress();
        state = next;
    }
    assert_eq!(state.lifecycle(), Lifecycle::Running);
}

#[test]
fn thirty_seconds_without_reports_stays_strictly_inside_the_ceiling() {
    init_logging();
    let (state, run) = running();
    // 60 ticks of 500ms.
    let (state, _) = tick(state, run, 60);
    let view = state.view();

    assert!(view.progress > 0.0);
    assert!(view.progress < 90.0);
    assert_eq!(view.elapsed_secs, 30.0);
}

#[test]
fn simulated_progress_never_passes_the_ceiling() {
    init_logging();
    let (state, run) = running();
    let (state, _) = tick(state, run, 2_000);

    assert_eq!(state.progress(), 90.0);
    assert_eq!(state.lifecycle(), Lifecycle::Running);
}

#[test]
fn authoritative_progress_raises_the_estimate() {
    init_logging();
    let (state, run) = running();
    let (state, _) = tick(state, run, 4);
    let (state, _) = poll_status(state, run, JobStatus::running(40.0));
    assert_eq!(state.progress(), 40.0);

    // A lower report later changes nothing.
    let (state, _) = poll_status(state, run, JobStatus::running(15.0));
    assert_eq!(state.progress(), 40.0);
}

#[test]
fn remaining_time_estimate_replans_total_duration() {
    init_logging();
    let (state, run) = running();
    let (state, _) = tick(state, run, 20);
    let (state, _) = poll_status(
        state,
        run,
        JobStatus::running(5.0).with_remaining(200.0),
    );
    let view = state.view();
    assert_eq!(view.estimated_total_secs, 210.0);

    // Within tolerance of the new plan: unchanged.
    let (state, _) = poll_status(
        state,
        run,
        JobStatus::running(5.0).with_remaining(195.0),
    );
    assert_eq!(state.view().estimated_total_secs, 210.0);
}

#[test]
fn stage_and_message_follow_the_backend() {
    init_logging();
    let (state, run) = running();
    let (state, _) = poll_status(
        state,
        run,
        JobStatus::running(12.0).with_stage("matching", "Scoring candidates"),
    );
    let view = state.view();
    assert_eq!(view.stage_name, "matching");
    assert_eq!(view.message, "Scoring candidates");
}

#[test]
fn live_matches_engage_once_past_threshold() {
    init_logging();
    let (state, run) = running();
    let (state, effects) = poll_status(state, run, JobStatus::running(8.0));
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::Arm { timer: Timer::LiveMatches, .. })));
    assert!(!state.live_matches_engaged());

    let (state, effects) = poll_status(state, run, JobStatus::running(11.0));
    assert!(effects.contains(&Effect::Arm {
        run,
        timer: Timer::LiveMatches,
        interval: Duration::from_millis(3000),
    }));
    assert!(state.live_matches_engaged());

    let (_state, effects) = poll_status(state, run, JobStatus::running(30.0));
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::Arm { timer: Timer::LiveMatches, .. })));
}

#[test]
fn live_match_threshold_is_configurable() {
    init_logging();
    let config = MonitorConfig {
        live_match_threshold: 50.0,
        ..MonitorConfig::default()
    };
    let (state, run) = running_with(config, JobConfig::default());
    let (state, _) = poll_status(state, run, JobStatus::running(40.0));
    assert!(!state.live_matches_engaged());
    let (state, _) = poll_status(state, run, JobStatus::running(51.0));
    assert!(state.live_matches_engaged());
}

#[test]
fn simulated_ticks_also_engage_live_matches() {
    init_logging();
    let (state, run) = running();
    // 0.5 per tick with the default 90s plan; 21 ticks reach 10.5.
    let (state, effects) = tick(state, run, 21);
    assert!(state.progress() > 10.0);
    assert!(effects
        .iter()
        .any(|effect| matches!(effect, Effect::Arm { timer: Timer::LiveMatches, .. })));
}

#[test]
fn jump_over_thresholds_fires_each_once() {
    init_logging();
    let (state, run) = running();
    let (state, first) = poll_status(state, run, JobStatus::running(20.0));
    let (state, second) = poll_status(state, run, JobStatus::running(60.0));
    let (state, third) = poll_status(state, run, JobStatus::running(62.0));
    let (_state, fourth) = tick(state, run, 10);

    assert!(milestone_events(&first).is_empty());
    assert_eq!(milestone_events(&second), vec![25, 50]);
    assert!(milestone_events(&third).is_empty());
    assert!(milestone_events(&fourth).is_empty());
}

#[test]
fn simulated_climb_fires_milestones_in_order() {
    init_logging();
    let (state, run) = running();
    let (state, effects) = tick(state, run, 180);

    assert_eq!(milestone_events(&effects), vec![25, 50, 75]);
    assert_eq!(state.view().milestones_fired, vec![25, 50, 75]);
}

#[test]
fn milestones_rearm_on_the_next_run() {
    init_logging();
    let (state, run) = running();
    let (state, _) = poll_status(state, run, JobStatus::running(30.0));
    let (state, _) = update(state, Msg::StopRequested);
    let (state, _) = update(state, Msg::StartRequested(JobConfig::default()));
    let (state, _) = update(state, Msg::SubmissionAccepted { run: 2 });
    let (_state, effects) = poll_status(state, 2, JobStatus::running(26.0));

    assert_eq!(milestone_events(&effects), vec![25]);
}
