// Reads ProgressEvents from an async channel and keeps a one-line status
// display up to date.

use std::io;
use std::io::Write;
use std::time::Duration;

use async_channel::Receiver;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3empty_rs::ProgressEvent;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals returned by [`show_indicator`] once the event channel closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub deleted: u64,
    pub failed: u64,
    pub legal_holds_cleared: u64,
    pub batches: u64,
    pub poll_attempts: u32,
    pub last_poll_status: Option<String>,
}

impl IndicatorSummary {
    fn record(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::ObjectDeleted { .. } => self.deleted += 1,
            ProgressEvent::DeleteFailed { .. } => self.failed += 1,
            ProgressEvent::LegalHoldCleared { .. } => self.legal_holds_cleared += 1,
            ProgressEvent::BatchCompleted { .. } => self.batches += 1,
            ProgressEvent::PollAttempt { attempt, status } => {
                self.poll_attempts = attempt;
                self.last_poll_status = Some(status);
            }
        }
    }

    fn message(&self, objects_per_sec: u64) -> String {
        let mut message = format!(
            "deleted {:>3} object versions | {:>3} versions/sec,  failed {},  legal holds cleared {}",
            HumanCount(self.deleted),
            HumanCount(objects_per_sec),
            self.failed,
            self.legal_holds_cleared,
        );
        if let Some(status) = &self.last_poll_status {
            message.push_str(&format!(
                ",  waiting: {status} (attempt {})",
                self.poll_attempts
            ));
        }
        message
    }
}

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Spawn a task that consumes `receiver` until every sender is dropped.
///
/// `show_progress` controls the live line, `show_result` the final line.
/// A summary is always logged at info level.
pub fn show_indicator(
    receiver: Receiver<ProgressEvent>,
    show_progress: bool,
    show_result: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();
        let mut summary = IndicatorSummary::default();
        let mut last_refresh = Instant::now();

        loop {
            while let Ok(event) = receiver.try_recv() {
                summary.record(event);
            }

            if receiver.is_closed() && receiver.is_empty() {
                break;
            }

            if show_progress && REFRESH_INTERVAL <= last_refresh.elapsed() {
                progress_text.set_message(summary.message(rate(summary.deleted, start_time)));
                last_refresh = Instant::now();
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let elapsed = start_time.elapsed();
        let objects_per_sec = rate(summary.deleted, start_time);

        info!(
            message = "erase summary",
            deleted_objects = summary.deleted,
            deleted_objects_per_sec = objects_per_sec,
            failed = summary.failed,
            legal_holds_cleared = summary.legal_holds_cleared,
            batches = summary.batches,
            duration_sec = elapsed.as_secs_f64(),
        );

        if show_result {
            if let Ok(style) = ProgressStyle::with_template("{msg}") {
                progress_text.set_style(style);
            }
            progress_text.finish_with_message(format!(
                "{},  duration {}",
                summary.message(objects_per_sec),
                HumanDuration(elapsed)
            ));

            println!();
            let _ = io::stdout().flush();
        } else {
            progress_text.finish_and_clear();
        }

        summary
    })
}

fn rate(count: u64, start_time: Instant) -> u64 {
    let elapsed = start_time.elapsed();
    if elapsed < REFRESH_INTERVAL {
        return count;
    }
    (count as f64 / elapsed.as_secs_f64()) as u64
}
