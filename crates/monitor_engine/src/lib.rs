//! Job monitor engine: HTTP status channel, polling timers and effect execution.
mod channel;
mod engine;
mod persist;
mod scheduler;
mod types;

pub use channel::{ChannelSettings, Endpoints, HttpStatusChannel, StatusChannel};
pub use engine::MonitorHandle;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use scheduler::PollingScheduler;
pub use types::{ChannelError, FailureKind, MonitorClosed, MonitorOutput};
