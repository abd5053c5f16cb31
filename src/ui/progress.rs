use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::RunResult;
use crate::utils::{format_count, format_duration};

/// Terminal progress for one batch run. Hidden when stderr is not a terminal
/// or when output is JSON.
pub struct RunProgress {
    bar: ProgressBar,
    started_at: Instant,
    baseline: u64,
}

impl RunProgress {
    pub fn new(label: &str, estimated_rows: u64, start_offset: u64, hidden: bool) -> Self {
        let baseline = start_offset.saturating_sub(1);
        let bar = if hidden || !std::io::stderr().is_terminal() {
            ProgressBar::hidden()
        } else {
            bounded_bar(estimated_rows, label)
        };
        bar.set_position(baseline.min(estimated_rows));
        Self {
            bar,
            started_at: Instant::now(),
            baseline,
        }
    }

    pub fn update(&self, running: &RunResult) {
        if let Some(length) = self.bar.length() {
            if running.total_rows > length {
                self.bar.set_length(running.total_rows);
            }
        }
        self.bar.set_position(running.processed);
        self.bar.set_message(progress_message(
            running,
            self.baseline,
            self.started_at.elapsed(),
        ));
    }

    pub fn println(&self, message: impl AsRef<str>) {
        self.bar.println(message);
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn bounded_bar(total: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent:>3}%) | {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_prefix(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// One-line status: outcome counts plus the row rate of this invocation.
pub fn progress_message(running: &RunResult, baseline: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64().max(1.0);
    let rate = running.processed.saturating_sub(baseline) as f64 / secs;

    let mut parts = vec![format!("{} ok", format_count(running.successful))];
    if let Some(skipped) = running.skipped() {
        parts.push(format!("{} skipped", format_count(skipped)));
    }
    if let Some(not_found) = running.not_found() {
        parts.push(format!("{} not found", format_count(not_found)));
    }
    parts.push(format!("{} errors", format_count(running.errors.len() as u64)));
    parts.push(format!("{rate:.1} rows/s"));
    parts.push(format!("elapsed {}", format_duration(elapsed.as_secs())));
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Flavor, Tally};

    #[test]
    fn import_message_shows_skipped() {
        let mut running = RunResult::empty(Flavor::Import, 1);
        running.processed = 1200;
        running.successful = 1100;
        running.tally = Tally::Import { skipped: 90 };
        running.errors = vec!["row 3: bad".into(); 10];

        let message = progress_message(&running, 0, Duration::from_secs(10));
        assert_eq!(
            message,
            "1,100 ok | 90 skipped | 10 errors | 120.0 rows/s | elapsed 00:10"
        );
    }

    #[test]
    fn update_message_rate_excludes_resumed_rows() {
        let mut running = RunResult::empty(Flavor::Update, 501);
        running.processed = 600;
        running.successful = 95;
        running.tally = Tally::Update {
            not_found: 5,
            not_found_names: Vec::new(),
        };

        let message = progress_message(&running, 500, Duration::from_secs(4));
        assert!(message.contains("5 not found"));
        assert!(message.contains("25.0 rows/s"));
        assert!(!message.contains("skipped"));
    }
}
