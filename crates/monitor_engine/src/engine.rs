use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use monitor_core::{
    update, Effect, JobConfig, MonitorConfig, MonitorEvent, MonitorState, Msg, RunId, Stream,
    Timer, TransportFailure,
};
use monitor_logging::{monitor_debug, monitor_error, monitor_info, monitor_warn};
use tokio::sync::mpsc as async_mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelSettings, HttpStatusChannel, StatusChannel};
use crate::scheduler::PollingScheduler;
use crate::{ChannelError, MonitorClosed, MonitorOutput};

enum MonitorCommand {
    Start(JobConfig),
    Stop,
    DownloadResult,
}

/// Everything the event loop reacts to, in arrival order.
enum LoopInput {
    Msg(Msg),
    Command(MonitorCommand),
    Shutdown,
}

/// Owns the monitor's event loop thread. Commands go in, views and events
/// come out.
pub struct MonitorHandle {
    input_tx: async_mpsc::UnboundedSender<LoopInput>,
    output_rx: mpsc::Receiver<MonitorOutput>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn new(config: MonitorConfig, channel: Arc<dyn StatusChannel>) -> Self {
        let (input_tx, input_rx) = async_mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel();
        let loop_tx = input_tx.clone();

        let thread = thread::Builder::new()
            .name("job-monitor".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        monitor_error!("Failed to start monitor runtime: {err}");
                        return;
                    }
                };
                let driver = Driver::new(config, channel, loop_tx, output_tx);
                runtime.block_on(driver.run(input_rx));
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(err) => {
                monitor_error!("Failed to spawn monitor thread: {err}");
                None
            }
        };

        Self {
            input_tx,
            output_rx,
            thread,
        }
    }

    pub fn with_http(
        config: MonitorConfig,
        settings: ChannelSettings,
    ) -> Result<Self, ChannelError> {
        let channel = HttpStatusChannel::new(settings)?;
        Ok(Self::new(config, Arc::new(channel)))
    }

    pub fn start(&self, job: JobConfig) {
        self.send(LoopInput::Command(MonitorCommand::Start(job)));
    }

    pub fn stop(&self) {
        self.send(LoopInput::Command(MonitorCommand::Stop));
    }

    /// Fetch the result file. The answer arrives as [`MonitorOutput::Download`].
    pub fn download_result(&self) {
        self.send(LoopInput::Command(MonitorCommand::DownloadResult));
    }

    pub fn try_recv(&self) -> Option<MonitorOutput> {
        self.output_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next output. `Ok(None)` means nothing
    /// arrived in time; `Err` means the loop thread is gone for good.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<MonitorOutput>, MonitorClosed> {
        match self.output_rx.recv_timeout(timeout) {
            Ok(output) => Ok(Some(output)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(MonitorClosed),
        }
    }

    /// Stop the loop and wait for its thread. Timers and in-flight requests
    /// are dropped with it.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn send(&self, input: LoopInput) {
        if self.input_tx.send(input).is_err() {
            monitor_warn!("Monitor loop is gone; input dropped");
        }
    }

    fn close(&mut self) {
        let _ = self.input_tx.send(LoopInput::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                monitor_error!("Monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.close();
    }
}

struct Driver {
    state: MonitorState,
    channel: Arc<dyn StatusChannel>,
    loop_tx: async_mpsc::UnboundedSender<LoopInput>,
    output_tx: mpsc::Sender<MonitorOutput>,
    estimator_timer: PollingScheduler,
    status_timer: PollingScheduler,
    live_timer: PollingScheduler,
    retries: CancellationToken,
}

impl Driver {
    fn new(
        config: MonitorConfig,
        channel: Arc<dyn StatusChannel>,
        loop_tx: async_mpsc::UnboundedSender<LoopInput>,
        output_tx: mpsc::Sender<MonitorOutput>,
    ) -> Self {
        Self {
            state: MonitorState::new(config),
            channel,
            loop_tx,
            output_tx,
            estimator_timer: PollingScheduler::new("estimator"),
            status_timer: PollingScheduler::new("status"),
            live_timer: PollingScheduler::new("live-matches"),
            retries: CancellationToken::new(),
        }
    }

    async fn run(mut self, mut input_rx: async_mpsc::UnboundedReceiver<LoopInput>) {
        while let Some(input) = input_rx.recv().await {
            match input {
                LoopInput::Msg(msg) => self.dispatch(msg),
                LoopInput::Command(MonitorCommand::Start(job)) => {
                    self.dispatch(Msg::StartRequested(job))
                }
                LoopInput::Command(MonitorCommand::Stop) => self.dispatch(Msg::StopRequested),
                LoopInput::Command(MonitorCommand::DownloadResult) => self.download(),
                LoopInput::Shutdown => break,
            }
        }
        self.disarm_all();
        monitor_debug!("Monitor loop finished");
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (mut next, effects) = update(state, msg);
        self.state_changed(&mut next);
        self.state = next;
        for effect in effects {
            self.execute(effect);
        }
    }

    fn state_changed(&self, state: &mut MonitorState) {
        let view = state.view();
        if state.consume_dirty() {
            self.emit(MonitorOutput::View(view));
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::SubmitJob { run, config } => {
                monitor_info!("Submitting job for run {run}");
                let channel = self.channel.clone();
                self.spawn_msg(async move {
                    match channel.submit(&config).await {
                        Ok(()) => Msg::SubmissionAccepted { run },
                        Err(err) => Msg::SubmissionFailed {
                            run,
                            reason: err.to_string(),
                        },
                    }
                });
            }
            Effect::Arm {
                run,
                timer,
                interval,
            } => self.arm(run, timer, interval),
            Effect::DisarmAll => self.disarm_all(),
            Effect::FetchStatus { run, seq } => {
                let channel = self.channel.clone();
                self.spawn_msg(async move {
                    match channel.fetch_status().await {
                        Ok(status) => Msg::StatusReceived { run, seq, status },
                        Err(err) => {
                            monitor_debug!("Status request {seq} failed: {err}");
                            Msg::StatusFailed {
                                run,
                                seq,
                                failure: TransportFailure::from(&err),
                            }
                        }
                    }
                });
            }
            Effect::FetchLiveMatches { run, seq } => {
                let channel = self.channel.clone();
                self.spawn_msg(async move {
                    match channel.fetch_live_matches().await {
                        Ok(matches) => Msg::LiveMatchesReceived { run, seq, matches },
                        Err(err) => Msg::LiveMatchesFailed {
                            run,
                            seq,
                            failure: TransportFailure::from(&err),
                        },
                    }
                });
            }
            Effect::ScheduleRetry {
                run,
                stream,
                after_seq,
                delay,
            } => {
                let cancel = self.retries.child_token();
                let loop_tx = self.loop_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            let _ = loop_tx.send(LoopInput::Msg(Msg::RetryDue {
                                run,
                                stream,
                                after_seq,
                            }));
                        }
                    }
                });
            }
            Effect::FetchLatestResult { run } => {
                let channel = self.channel.clone();
                self.spawn_msg(async move {
                    match channel.fetch_latest_result().await {
                        Ok(result) => Msg::LatestResultReceived { run, result },
                        Err(err) => Msg::LatestResultFailed {
                            run,
                            reason: err.to_string(),
                        },
                    }
                });
            }
            Effect::Notify(event) => {
                log_event(&event);
                self.emit(MonitorOutput::Event(event));
            }
        }
    }

    fn arm(&mut self, run: RunId, timer: Timer, interval: Duration) {
        let loop_tx = self.loop_tx.clone();
        let tick = move || {
            let msg = match timer {
                Timer::Estimator => Msg::EstimatorTick { run },
                Timer::Status => Msg::PollDue {
                    run,
                    stream: Stream::Status,
                },
                Timer::LiveMatches => Msg::PollDue {
                    run,
                    stream: Stream::LiveMatches,
                },
            };
            let _ = loop_tx.send(LoopInput::Msg(msg));
        };
        let scheduler = match timer {
            Timer::Estimator => &mut self.estimator_timer,
            Timer::Status => &mut self.status_timer,
            Timer::LiveMatches => &mut self.live_timer,
        };
        if !scheduler.arm(interval, tick) {
            monitor_warn!("{} timer already armed", scheduler.name());
        }
    }

    fn disarm_all(&mut self) {
        self.estimator_timer.disarm();
        self.status_timer.disarm();
        self.live_timer.disarm();
        self.retries.cancel();
        self.retries = CancellationToken::new();
    }

    fn download(&self) {
        let channel = self.channel.clone();
        let output_tx = self.output_tx.clone();
        tokio::spawn(async move {
            let result = channel.download_result().await;
            if let Err(err) = &result {
                monitor_warn!("Result download failed: {err}");
            }
            let _ = output_tx.send(MonitorOutput::Download(result));
        });
    }

    fn spawn_msg<F>(&self, work: F)
    where
        F: std::future::Future<Output = Msg> + Send + 'static,
    {
        let loop_tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let msg = work.await;
            let _ = loop_tx.send(LoopInput::Msg(msg));
        });
    }

    fn emit(&self, output: MonitorOutput) {
        let _ = self.output_tx.send(output);
    }
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::SubmissionFailed { reason } => {
            monitor_warn!("Submission failed: {reason}")
        }
        MonitorEvent::ConnectionDegraded {
            consecutive_failures,
            class,
        } => monitor_warn!(
            "Connection degraded after {consecutive_failures} consecutive {class:?} failures"
        ),
        MonitorEvent::Failed { message, .. } => monitor_warn!("Job failed: {message}"),
        other => monitor_info!("Event {}", other.name()),
    }
}
