use crate::{JobConfig, JobStatus, LatestResult, LiveMatch, RunId, Stream, TransportFailure};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User asked to start a job.
    StartRequested(JobConfig),
    /// User abandoned the run. The backend job is left alone.
    StopRequested,
    /// Backend accepted the submission.
    SubmissionAccepted { run: RunId },
    /// Submission was rejected, failed or timed out.
    SubmissionFailed { run: RunId, reason: String },
    /// Estimator timer fired.
    EstimatorTick { run: RunId },
    /// Polling timer for a stream fired.
    PollDue { run: RunId, stream: Stream },
    /// Backoff delay for a failed request elapsed.
    RetryDue {
        run: RunId,
        stream: Stream,
        after_seq: u64,
    },
    StatusReceived {
        run: RunId,
        seq: u64,
        status: JobStatus,
    },
    StatusFailed {
        run: RunId,
        seq: u64,
        failure: TransportFailure,
    },
    LiveMatchesReceived {
        run: RunId,
        seq: u64,
        matches: Vec<LiveMatch>,
    },
    LiveMatchesFailed {
        run: RunId,
        seq: u64,
        failure: TransportFailure,
    },
    LatestResultReceived { run: RunId, result: LatestResult },
    LatestResultFailed { run: RunId, reason: String },
    /// Fallback for placeholder wiring.
    NoOp,
}
