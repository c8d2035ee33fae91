//! Outcome aggregation and the observer interface.
//!
//! The aggregator is the single consumer of the scheduler's outcome channel.
//! It appends one formatted line per outcome to an append-only log,
//! recomputes the completion percentage, and forwards both to the observer.
//! The observer is a passive sink and must not block these calls for long.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::fetch::{FetchOutcome, ItemOutcome};
use crate::job::JobState;

/// Sink for per-item outcome lines and the overall completion percentage.
///
/// Implemented by the shell embedding the orchestrator (CLI console, GUI,
/// log collector). Percentage is monotone non-decreasing over the job's
/// lifetime and reaches exactly 100 once every item has a terminal outcome.
pub trait ProgressObserver: Send + Sync {
    /// Receives one human-readable outcome line, oldest-first.
    fn on_log_line(&self, line: &str);
    /// Receives the recomputed completion percentage (0..=100).
    fn on_progress(&self, percent: u8);
}

/// Per-kind outcome counts accumulated while draining a job.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeTally {
    /// Items skipped because a local artifact already existed.
    pub skipped: usize,
    /// Items downloaded without extraction.
    pub downloaded: usize,
    /// Items downloaded and extracted.
    pub extracted: usize,
    /// Items that failed to fetch or extract.
    pub failed: usize,
}

impl OutcomeTally {
    /// Total items recorded.
    #[must_use]
    pub fn total(&self) -> usize {
        self.skipped + self.downloaded + self.extracted + self.failed
    }
}

/// Converts outcomes into observer notifications.
///
/// Owns only derived display state (the log, the last percentage); the
/// completed counter lives in [`JobState`] and is read through it.
pub struct Aggregator {
    observer: Arc<dyn ProgressObserver>,
    state: Arc<JobState>,
    log: Vec<String>,
}

impl Aggregator {
    /// Creates an aggregator forwarding to `observer`.
    #[must_use]
    pub fn new(observer: Arc<dyn ProgressObserver>, state: Arc<JobState>) -> Self {
        Self {
            observer,
            state,
            log: Vec::new(),
        }
    }

    /// Records one terminal outcome: appends the formatted line and forwards
    /// line plus recomputed percentage to the observer.
    pub fn record(&mut self, outcome: &ItemOutcome) {
        let line = format_outcome(outcome);
        self.observer.on_log_line(&line);
        self.log.push(line);
        self.observer.on_progress(self.state.percent());
    }

    /// Emits an informational line (throttling notices, precheck text)
    /// without touching the percentage.
    pub fn note(&mut self, line: &str) {
        self.observer.on_log_line(line);
        self.log.push(line.to_string());
    }

    /// Drains the outcome channel to completion, returning per-kind counts.
    ///
    /// Returns once every sender has been dropped, i.e. once the scheduler
    /// has produced a terminal outcome for every item.
    pub async fn drain(&mut self, mut rx: mpsc::UnboundedReceiver<ItemOutcome>) -> OutcomeTally {
        let mut tally = OutcomeTally::default();
        while let Some(outcome) = rx.recv().await {
            match outcome.outcome {
                FetchOutcome::Skipped { .. } => tally.skipped += 1,
                FetchOutcome::Downloaded { .. } => tally.downloaded += 1,
                FetchOutcome::Extracted => tally.extracted += 1,
                FetchOutcome::Failed { .. } => tally.failed += 1,
            }
            self.record(&outcome);
        }
        debug!(?tally, "outcome channel drained");
        tally
    }

    /// The append-only log of emitted lines, oldest-first.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }
}

/// Formats one outcome as its user-facing log line.
fn format_outcome(outcome: &ItemOutcome) -> String {
    match &outcome.outcome {
        FetchOutcome::Skipped { reason } => {
            format!("{} {reason}.", outcome.identifier)
        }
        FetchOutcome::Downloaded { .. } => format!("Downloaded {}", outcome.identifier),
        FetchOutcome::Extracted => format!("Downloaded and extracted {}", outcome.identifier),
        FetchOutcome::Failed { error } => {
            format!("Failed to download {}: {error}", outcome.identifier)
        }
    }
}
