use std::time::Duration;

use monitor_logging::monitor_debug;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A repeating timer that is either armed or not. The first tick fires one
/// interval after arming.
///
/// Must be armed from inside a tokio runtime.
#[derive(Debug)]
pub struct PollingScheduler {
    name: &'static str,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cancel: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_armed(&self) -> bool {
        self.cancel.is_some()
    }

    /// Start ticking. Returns `false` and leaves the running timer alone when
    /// already armed.
    pub fn arm<F>(&mut self, period: Duration, mut on_tick: F) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        if self.is_armed() {
            return false;
        }
        let period = period.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let name = self.name;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => on_tick(),
                }
            }
            monitor_debug!("{name} timer stopped");
        });

        monitor_debug!("{} timer armed every {:?}", self.name, period);
        self.cancel = Some(cancel);
        self.handle = Some(handle);
        true
    }

    /// Stop ticking. Harmless when not armed.
    pub fn disarm(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
