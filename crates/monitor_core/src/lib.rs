//! Job monitor core: pure lifecycle state machine, progress estimation and
//! view-model helpers. No I/O and no clocks; time advances through messages.
mod config;
mod effect;
mod estimator;
mod milestone;
mod msg;
mod retry;
mod state;
mod status;
mod update;
mod view_model;

pub use config::MonitorConfig;
pub use effect::{Effect, MonitorEvent, Timer};
pub use estimator::ProgressEstimator;
pub use milestone::{MilestoneNotifier, MilestoneSet};
pub use msg::Msg;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use state::{Lifecycle, MonitorState};
pub use status::{
    FailureClass, JobConfig, JobStatus, LatestResult, LiveMatch, MatchRecord, RunId, Stream,
    TransportFailure,
};
pub use update::update;
pub use view_model::MonitorView;
