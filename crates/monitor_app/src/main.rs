mod config;
mod logging;
mod render;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use monitor_core::MonitorEvent;
use monitor_engine::{AtomicFileWriter, MonitorHandle, MonitorOutput};
use monitor_logging::{monitor_error, monitor_info};

use crate::config::AppConfig;
use crate::logging::LogDestination;
use crate::render::Renderer;

/// How long to wait for the result summary and download after completion.
const RESULT_GRACE: Duration = Duration::from_secs(30);
const POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "job-monitor",
    version,
    about = "Start an allocation job and follow its progress"
)]
struct Cli {
    /// RON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8000/
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    rural_quota: Option<f64>,

    #[arg(long)]
    reserved_quota: Option<f64>,

    #[arg(long)]
    female_quota: Option<f64>,

    #[arg(long)]
    top_k_similarity: Option<u32>,

    /// Optimization time budget in seconds.
    #[arg(long)]
    optimization_time: Option<u64>,

    /// Save the result file into this directory once the job completes.
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Stop monitoring after this many seconds.
    #[arg(long)]
    give_up_after: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogDestination::File)]
    log: LogDestination,

    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as RON and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(base_url) = &self.base_url {
            config.channel.base_url = base_url.clone();
        }
        if let Some(value) = self.rural_quota {
            config.job.rural_quota = value;
        }
        if let Some(value) = self.reserved_quota {
            config.job.reserved_quota = value;
        }
        if let Some(value) = self.female_quota {
            config.job.female_quota = value;
        }
        if let Some(value) = self.top_k_similarity {
            config.job.top_k_similarity = value;
        }
        if let Some(value) = self.optimization_time {
            config.job.optimization_time = value;
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);

    if cli.print_config {
        println!("{}", config.to_ron()?);
        return Ok(());
    }

    let give_up_after = cli.give_up_after.map(Duration::from_secs);
    let result = run(&config, give_up_after);
    if let Err(err) = &result {
        monitor_error!("job-monitor failed: {err:#}");
    }
    result
}

fn run(config: &AppConfig, give_up_after: Option<Duration>) -> anyhow::Result<()> {
    let handle = MonitorHandle::with_http(config.monitor.clone(), config.channel.clone())
        .context("invalid backend settings")?;
    let mut renderer = Renderer::new(std::io::stdout());

    monitor_info!(
        "Starting job against {} with {:?}",
        config.channel.base_url,
        config.job
    );
    handle.start(config.job.clone());

    let started = Instant::now();
    let mut stop_sent = false;
    let mut completed_at: Option<Instant> = None;
    let mut awaiting_summary = false;
    let mut awaiting_download = false;

    loop {
        if let Some(limit) = give_up_after {
            if !stop_sent && completed_at.is_none() && started.elapsed() >= limit {
                renderer.note("Giving up, stopping the monitor")?;
                handle.stop();
                stop_sent = true;
            }
        }
        if let Some(at) = completed_at {
            if !awaiting_summary && !awaiting_download {
                break;
            }
            if at.elapsed() >= RESULT_GRACE {
                renderer.note("Timed out waiting for the result")?;
                break;
            }
        }

        let Some(output) = handle
            .recv_timeout(POLL)
            .context("monitor stopped before the job finished")?
        else {
            continue;
        };
        match output {
            MonitorOutput::View(view) => {
                renderer.view(&view)?;
                if awaiting_summary {
                    if let Some(result) = &view.latest_result {
                        renderer.summary(result)?;
                        awaiting_summary = false;
                    } else if let Some(reason) = &view.last_error {
                        renderer.note(&format!("Result summary unavailable: {reason}"))?;
                        awaiting_summary = false;
                    }
                }
            }
            MonitorOutput::Event(event) => {
                renderer.event(&event)?;
                match event {
                    MonitorEvent::Completed { .. } => {
                        completed_at = Some(Instant::now());
                        awaiting_summary = true;
                        if config.download_dir.is_some() {
                            handle.download_result();
                            awaiting_download = true;
                        }
                    }
                    MonitorEvent::SubmissionFailed { reason } => {
                        handle.shutdown();
                        bail!("job was not started: {reason}");
                    }
                    MonitorEvent::Failed { message, .. } => {
                        handle.shutdown();
                        bail!("job failed: {message}");
                    }
                    MonitorEvent::Stopped { .. } => {
                        handle.shutdown();
                        bail!("gave up before the job finished");
                    }
                    _ => {}
                }
            }
            MonitorOutput::Download(result) => {
                awaiting_download = false;
                let body = result.context("downloading the result file")?;
                if let Some(dir) = &config.download_dir {
                    let filename = format!(
                        "allocation-{}.csv",
                        chrono::Local::now().format("%Y%m%d-%H%M%S")
                    );
                    let path = AtomicFileWriter::new(dir.clone())
                        .write(&filename, &body)
                        .context("saving the result file")?;
                    renderer.note(&format!("Saved result to {}", path.display()))?;
                }
            }
        }
    }

    handle.shutdown();
    Ok(())
}
