use std::io::{self, Write};

use chrono::{DateTime, Utc};
use monitor_core::{LatestResult, Lifecycle, MonitorEvent, MonitorView};

const BAR_WIDTH: usize = 30;

/// Prints the view model as one status line per visible change, plus a line
/// per named event.
pub struct Renderer<W: Write> {
    out: W,
    last_line: Option<String>,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_line: None,
        }
    }

    pub fn view(&mut self, view: &MonitorView) -> io::Result<()> {
        if !view.is_active() {
            return Ok(());
        }
        let line = status_line(view);
        if self.last_line.as_deref() == Some(line.as_str()) {
            return Ok(());
        }
        writeln!(self.out, "{line}")?;
        self.last_line = Some(line);
        self.out.flush()
    }

    pub fn event(&mut self, event: &MonitorEvent) -> io::Result<()> {
        writeln!(self.out, "{}", event_line(event))?;
        self.out.flush()
    }

    pub fn summary(&mut self, result: &LatestResult) -> io::Result<()> {
        writeln!(self.out, "{}", summary_line(result))?;
        for record in result.allocations.iter().take(5) {
            writeln!(
                self.out,
                "  {} -> {} ({}) score {:.2}",
                record.subject_id, record.counterparty_name, record.role_name, record.similarity_score
            )?;
        }
        self.out.flush()
    }

    pub fn note(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn status_line(view: &MonitorView) -> String {
    let percent = view.progress_percent();
    let filled = usize::from(percent) * BAR_WIDTH / 100;
    let mut line = format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        percent
    );
    if view.lifecycle == Lifecycle::Starting {
        line.push_str(" submitting");
    }
    if !view.stage_name.is_empty() {
        line.push(' ');
        line.push_str(&view.stage_name);
    }
    if !view.message.is_empty() {
        line.push_str(" - ");
        line.push_str(&view.message);
    }
    if !view.live_matches.is_empty() {
        line.push_str(&format!(" ({} live matches)", view.live_matches.len()));
    }
    if view.connection_degraded {
        line.push_str(" [connection degraded]");
    }
    line
}

fn event_line(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::Started { run } => format!("Job started (run {run})"),
        MonitorEvent::SubmissionFailed { reason } => format!("Could not start job: {reason}"),
        MonitorEvent::ConnectionDegraded {
            consecutive_failures,
            ..
        } => format!("Connection problems: {consecutive_failures} status checks failed in a row"),
        MonitorEvent::ConnectionRestored => "Connection restored".to_string(),
        MonitorEvent::Milestone { threshold } => format!("{threshold}% complete"),
        MonitorEvent::Completed { .. } => "Job completed".to_string(),
        MonitorEvent::Failed {
            progress, message, ..
        } => format!("Job failed at {progress:.0}%: {message}"),
        MonitorEvent::Stopped { .. } => "Monitoring stopped".to_string(),
    }
}

fn summary_line(result: &LatestResult) -> String {
    let mut line = format!(
        "Result: {} allocations of {} candidates",
        result.allocations.len(),
        result.total
    );
    if let Some(generated) = result.timestamp.and_then(format_timestamp) {
        line.push_str(&format!(", generated {generated}"));
    }
    line
}

fn format_timestamp(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::LiveMatch;

    fn running_view(progress: f64) -> MonitorView {
        MonitorView {
            lifecycle: Lifecycle::Running,
            progress,
            ..MonitorView::default()
        }
    }

    #[test]
    fn status_line_shows_bar_stage_and_flags() {
        let mut view = running_view(50.0);
        view.stage_name = "optimizing".to_string();
        view.message = "round 3".to_string();
        view.connection_degraded = true;
        view.live_matches = vec![LiveMatch {
            subject_id: "S-1".to_string(),
            subject_name: String::new(),
            counterparty_name: String::new(),
            role_name: String::new(),
            similarity_score: 0.5,
            success_probability: 0.5,
        }];

        let line = status_line(&view);
        assert!(line.starts_with(&format!("[{}{}]  50%", "#".repeat(15), ".".repeat(15))));
        assert!(line.contains(" optimizing - round 3"));
        assert!(line.contains("(1 live matches)"));
        assert!(line.ends_with("[connection degraded]"));
    }

    #[test]
    fn unchanged_lines_are_printed_once() {
        let mut renderer = Renderer::new(Vec::new());
        renderer.view(&running_view(12.4)).unwrap();
        renderer.view(&running_view(12.9)).unwrap();
        renderer.view(&running_view(13.0)).unwrap();

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn idle_views_are_not_printed() {
        let mut renderer = Renderer::new(Vec::new());
        renderer.view(&MonitorView::default()).unwrap();
        assert!(renderer.into_inner().is_empty());
    }

    #[test]
    fn summary_includes_generation_time() {
        let result = LatestResult {
            allocations: Vec::new(),
            total: 40.0,
            timestamp: Some(0.0),
        };
        assert_eq!(
            summary_line(&result),
            "Result: 0 allocations of 40 candidates, generated 1970-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn events_read_as_sentences() {
        assert_eq!(
            event_line(&MonitorEvent::Milestone { threshold: 75 }),
            "75% complete"
        );
        assert_eq!(
            event_line(&MonitorEvent::Failed {
                run: 1,
                progress: 42.0,
                message: "solver infeasible".to_string(),
            }),
            "Job failed at 42%: solver infeasible"
        );
    }
}
