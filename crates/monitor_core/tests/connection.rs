use std::sync::Once;
use std::time::Duration;

use monitor_core::{
    update, Effect, FailureClass, JobConfig, JobStatus, Lifecycle, LiveMatch, MonitorEvent,
    MonitorState, Msg, RunId, Stream, TransportFailure,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

fn running() -> (MonitorState, RunId) {
    let job = JobConfig {
        rural_quota: 30.0,
        reserved_quota: 50.0,
        female_quota: 33.0,
        top_k_similarity: 10,
        optimization_time: 60,
    };
    let (state, _) = update(MonitorState::default(), Msg::StartRequested(job));
    let (state, _) = update(state, Msg::SubmissionAccepted { run: 1 });
    (state, 1)
}

fn issue(state: MonitorState, run: RunId, stream: Stream) -> (MonitorState, u64) {
    let (state, effects) = update(state, Msg::PollDue { run, stream });
    let seq = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::FetchStatus { seq, .. } | Effect::FetchLiveMatches { seq, .. } => Some(*seq),
            _ => None,
        })
        .expect("fetch issued");
    (state, seq)
}

/// Report enough authoritative progress to engage live-match polling.
fn engaged() -> (MonitorState, RunId) {
    let (state, run) = running();
    let (state, seq) = issue(state, run, Stream::Status);
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            run,
            seq,
            status: JobStatus::running(15.0),
        },
    );
    assert!(state.live_matches_engaged());
    (state, run)
}

fn fail_status(
    state: MonitorState,
    run: RunId,
    failure: TransportFailure,
) -> (MonitorState, Vec<Effect>) {
    let (state, seq) = issue(state, run, Stream::Status);
    update(state, Msg::StatusFailed { run, seq, failure })
}

fn sample_match(id: &str) -> LiveMatch {
    LiveMatch {
        subject_id: id.to_string(),
        subject_name: "Asha".to_string(),
        counterparty_name: "Northwind".to_string(),
        role_name: "Analyst".to_string(),
        similarity_score: 0.82,
        success_probability: 0.64,
    }
}

#[test]
fn five_timeouts_degrade_then_a_success_recovers() {
    init_logging();
    let (mut state, run) = running();
    let mut retry_delays = Vec::new();

    for attempt in 1..=5 {
        let (next, effects) = fail_status(state, run, TransportFailure::timeout("timed out"));
        state = next;
        for effect in effects {
            match effect {
                Effect::ScheduleRetry { delay, .. } => retry_delays.push(delay),
                Effect::Notify(event) => {
                    assert_eq!(attempt, 5);
                    assert_eq!(
                        event,
                        MonitorEvent::ConnectionDegraded {
                            consecutive_failures: 5,
                            class: FailureClass::Timeout,
                        }
                    );
                }
                other => panic!("unexpected effect {other:?}"),
            }
        }
    }

    assert_eq!(
        retry_delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
            Duration::from_millis(5000),
        ]
    );
    let view = state.view();
    assert!(view.connection_degraded);
    assert_eq!(view.lifecycle, Lifecycle::Running);

    let (state, seq) = issue(state, run, Stream::Status);
    let (state, effects) = update(
        state,
        Msg::StatusReceived {
            run,
            seq,
            status: JobStatus::running(40.0),
        },
    );
    let view = state.view();
    assert_eq!(view.progress, 40.0);
    assert!(!view.connection_degraded);
    assert!(effects.contains(&Effect::Notify(MonitorEvent::ConnectionRestored)));
}

#[test]
fn other_errors_degrade_after_three_failures() {
    init_logging();
    let (state, run) = running();
    let (state, _) = fail_status(state, run, TransportFailure::other("502"));
    let (state, _) = fail_status(state, run, TransportFailure::other("502"));
    assert!(!state.is_connection_degraded());
    let (state, effects) = fail_status(state, run, TransportFailure::other("502"));

    assert!(state.is_connection_degraded());
    assert_eq!(
        effects,
        vec![Effect::Notify(MonitorEvent::ConnectionDegraded {
            consecutive_failures: 3,
            class: FailureClass::Other,
        })]
    );

    // Still degraded: no duplicate banner, polling keeps going.
    let (state, effects) = fail_status(state, run, TransportFailure::other("502"));
    assert!(effects.is_empty());
    assert_eq!(state.lifecycle(), Lifecycle::Running);
}

#[test]
fn backoff_never_blocks_the_next_scheduled_poll() {
    init_logging();
    let (state, run) = running();
    let (state, effects) = fail_status(state, run, TransportFailure::timeout("slow"));
    assert_eq!(
        effects,
        vec![Effect::ScheduleRetry {
            run,
            stream: Stream::Status,
            after_seq: 1,
            delay: Duration::from_millis(1000),
        }]
    );

    // The regular tick fires before the retry delay elapses.
    let (state, effects) = update(
        state,
        Msg::PollDue {
            run,
            stream: Stream::Status,
        },
    );
    assert_eq!(effects, vec![Effect::FetchStatus { run, seq: 2 }]);

    // The late retry has been superseded.
    let (_state, effects) = update(
        state,
        Msg::RetryDue {
            run,
            stream: Stream::Status,
            after_seq: 1,
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn retry_due_reissues_when_nothing_newer_went_out() {
    init_logging();
    let (state, run) = running();
    let (state, _) = fail_status(state, run, TransportFailure::other("reset"));
    let (_state, effects) = update(
        state,
        Msg::RetryDue {
            run,
            stream: Stream::Status,
            after_seq: 1,
        },
    );
    assert_eq!(effects, vec![Effect::FetchStatus { run, seq: 2 }]);
}

#[test]
fn overlapping_ticks_are_skipped_while_a_request_is_outstanding() {
    init_logging();
    let (state, run) = running();
    let (state, seq) = issue(state, run, Stream::Status);
    assert!(!state.stream_idle(Stream::Status));

    let (state, effects) = update(
        state,
        Msg::PollDue {
            run,
            stream: Stream::Status,
        },
    );
    assert!(effects.is_empty());

    let (state, _) = update(
        state,
        Msg::StatusReceived {
            run,
            seq,
            status: JobStatus::running(10.0),
        },
    );
    assert!(state.stream_idle(Stream::Status));
}

#[test]
fn responses_for_unknown_requests_are_discarded() {
    init_logging();
    let (state, run) = running();
    let (state, _seq) = issue(state, run, Stream::Status);
    let before = state.clone();

    let (state, effects) = update(
        state,
        Msg::StatusReceived {
            run,
            seq: 7,
            status: JobStatus::finished(100.0),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn live_matches_replace_the_list() {
    init_logging();
    let (state, run) = engaged();
    let (state, seq) = issue(state, run, Stream::LiveMatches);
    let (state, effects) = update(
        state,
        Msg::LiveMatchesReceived {
            run,
            seq,
            matches: vec![sample_match("s-1"), sample_match("s-2")],
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().live_matches.len(), 2);
}

#[test]
fn live_match_failures_never_touch_the_lifecycle() {
    init_logging();
    let (state, run) = engaged();
    let (state, seq) = issue(state, run, Stream::LiveMatches);
    let (mut state, _) = update(
        state,
        Msg::LiveMatchesReceived {
            run,
            seq,
            matches: vec![sample_match("s-1")],
        },
    );

    let mut notifications = 0;
    for _ in 0..3 {
        let (next, seq) = issue(state, run, Stream::LiveMatches);
        let (next, effects) = update(
            next,
            Msg::LiveMatchesFailed {
                run,
                seq,
                failure: TransportFailure::other("500"),
            },
        );
        notifications += effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Notify(_)))
            .count();
        state = next;
    }

    let view = state.view();
    assert_eq!(notifications, 0);
    assert!(view.live_matches.is_empty());
    assert!(!view.connection_degraded);
    assert_eq!(view.lifecycle, Lifecycle::Running);
}

#[test]
fn live_match_polls_wait_for_engagement() {
    init_logging();
    let (state, run) = running();
    assert!(!state.live_matches_engaged());

    let (state, effects) = update(
        state,
        Msg::PollDue {
            run,
            stream: Stream::LiveMatches,
        },
    );
    assert!(effects.is_empty());
    assert!(state.stream_idle(Stream::LiveMatches));

    let (state, seq) = issue(state, run, Stream::Status);
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            run,
            seq,
            status: JobStatus::running(15.0),
        },
    );
    let (_, effects) = update(
        state,
        Msg::PollDue {
            run,
            stream: Stream::LiveMatches,
        },
    );
    assert!(matches!(
        effects.as_slice(),
        [Effect::FetchLiveMatches { seq: 1, .. }]
    ));
}
