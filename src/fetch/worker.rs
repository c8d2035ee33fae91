//! Bounded worker pool running fetch+extract pipelines.
//!
//! The scheduler dispatches work items in enumeration order, holding at most
//! `max_workers` fetches in flight via a semaphore. Completion order is
//! unspecified; the aggregator only counts completions. Every item yields
//! exactly one terminal outcome and exactly one completed-counter increment,
//! and individual failures never halt the job.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use super::client::PartClient;
use super::error::FetchError;
use crate::extract::{extract_archive, is_zip_archive};
use crate::job::JobState;
use crate::manifest::WorkItem;

/// Minimum allowed worker pool size.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker pool size.
///
/// Upstream bandwidth and destination-disk write contention make larger
/// fan-out counterproductive.
pub const MAX_WORKERS: usize = 64;

/// Terminal result of processing one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A local artifact already exists; no network access was made.
    Skipped {
        /// Why the item was skipped.
        reason: String,
    },
    /// The part was downloaded and is not an archive.
    Downloaded {
        /// Bytes written to the local path.
        bytes_written: u64,
    },
    /// The part was downloaded and its archive expanded.
    Extracted,
    /// The fetch or extraction failed; the job continues.
    Failed {
        /// Human-readable error detail.
        error: String,
    },
}

/// One terminal outcome tagged with its item identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Identifier of the work item this outcome belongs to.
    pub identifier: String,
    /// The terminal outcome.
    pub outcome: FetchOutcome,
}

/// Source of remote part bytes.
///
/// The production implementation is [`PartClient`]; tests substitute
/// instrumented stubs to verify dispatch behavior without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Streams the item's remote object to its local path, returning the
    /// bytes written.
    async fn fetch(&self, item: &WorkItem) -> Result<u64, FetchError>;
}

#[async_trait]
impl Fetcher for PartClient {
    async fn fetch(&self, item: &WorkItem) -> Result<u64, FetchError> {
        self.fetch_to_path(&item.source_url, &item.local_path).await
    }
}

/// Error type for scheduler construction and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid worker pool size.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Bounded worker pool over the enumerated work list.
///
/// # Concurrency model
///
/// - A semaphore permit is acquired before each item is spawned, so at most
///   `max_workers` pipelines execute at once and dispatch follows
///   enumeration order.
/// - Permits are released when a pipeline finishes (RAII).
/// - Outcomes flow to the single consumer over an mpsc channel; the shared
///   completed counter is the only other mutable state.
#[derive(Debug)]
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
}

impl Scheduler {
    /// Creates a scheduler with the given worker pool size.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkers`] when the value is outside
    /// `1..=64`.
    pub fn new(max_workers: usize) -> Result<Self, SchedulerError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&max_workers) {
            return Err(SchedulerError::InvalidWorkers { value: max_workers });
        }
        debug!(max_workers, "creating scheduler");
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        })
    }

    /// Returns the configured worker pool size.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs every item to a terminal outcome.
    ///
    /// When `extract_dest` is `Some`, successfully downloaded ZIP archives
    /// are expanded into it immediately (single-phase pipeline); when `None`
    /// every success is reported as `Downloaded` (download-only phase).
    ///
    /// Returns once all items have produced a terminal outcome. There is no
    /// job-level timeout; only per-request timeouts bound individual stalls.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::SemaphoreClosed`] if the dispatch semaphore
    /// is closed; item-level failures are reported as outcomes, never as
    /// errors.
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        fetcher: Arc<dyn Fetcher>,
        extract_dest: Option<&Path>,
        state: Arc<JobState>,
        outcome_tx: mpsc::UnboundedSender<ItemOutcome>,
    ) -> Result<(), SchedulerError> {
        info!(items = items.len(), workers = self.max_workers, "dispatch starting");
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            // Acquiring before spawning bounds in-flight pipelines and keeps
            // dispatch in enumeration order.
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::SemaphoreClosed)?;

            let fetcher = Arc::clone(&fetcher);
            let state = Arc::clone(&state);
            let tx = outcome_tx.clone();
            let extract_dest = extract_dest.map(Path::to_path_buf);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = process_item(fetcher.as_ref(), &item, extract_dest.as_deref()).await;
                // Exactly one increment and one emitted outcome per item
                state.increment_completed();
                if tx
                    .send(ItemOutcome {
                        identifier: item.identifier,
                        outcome,
                    })
                    .is_err()
                {
                    warn!("outcome receiver dropped before job completion");
                }
            }));
        }
        drop(outcome_tx);

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }

        info!("dispatch complete");
        Ok(())
    }
}

/// Runs one item through the fetch(+extract) pipeline to a terminal outcome.
async fn process_item(
    fetcher: &dyn Fetcher,
    item: &WorkItem,
    extract_dest: Option<&Path>,
) -> FetchOutcome {
    // Whole-file presence is the resume mechanism. A truncated file from an
    // earlier interrupted run also passes this check and is silently skipped;
    // that gap is documented, not fixed.
    if item.local_path.exists() {
        debug!(identifier = %item.identifier, "local artifact present, skipping");
        return FetchOutcome::Skipped {
            reason: "already exists".to_string(),
        };
    }

    let bytes_written = match fetcher.fetch(item).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(identifier = %item.identifier, error = %e, "fetch failed");
            return FetchOutcome::Failed {
                error: e.to_string(),
            };
        }
    };

    if let Some(dest) = extract_dest
        && is_zip_archive(&item.identifier)
    {
        let archive = item.local_path.clone();
        let dest = dest.to_path_buf();
        // zip expansion is blocking CPU/IO work
        let result =
            tokio::task::spawn_blocking(move || extract_archive(&archive, &dest)).await;
        return match result {
            Ok(Ok(entries)) => {
                debug!(identifier = %item.identifier, entries, "archive extracted");
                FetchOutcome::Extracted
            }
            Ok(Err(e)) => {
                warn!(identifier = %item.identifier, error = %e, "extraction failed");
                FetchOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => FetchOutcome::Failed {
                error: format!("extraction task panicked: {e}"),
            },
        };
    }

    FetchOutcome::Downloaded { bytes_written }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    /// Instrumented fetcher recording call order and in-flight concurrency.
    struct StubFetcher {
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_identifiers: HashSet<String>,
        delay: Duration,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_identifiers: HashSet::new(),
                delay: Duration::ZERO,
            }
        }

        fn failing(identifiers: &[&str]) -> Self {
            let mut stub = Self::new();
            stub.fail_identifiers = identifiers.iter().map(ToString::to_string).collect();
            stub
        }

        fn with_delay(delay: Duration) -> Self {
            let mut stub = Self::new();
            stub.delay = delay;
            stub
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, item: &WorkItem) -> Result<u64, FetchError> {
            self.calls.lock().unwrap().push(item.identifier.clone());
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_identifiers.contains(&item.identifier) {
                return Err(FetchError::http_status(&item.source_url, 503));
            }
            Ok(42)
        }
    }

    fn test_items(dir: &std::path::Path, count: u32) -> Vec<WorkItem> {
        crate::manifest::Manifest::new("https://cdn.example/", "Official", count, dir).items()
    }

    async fn run_scheduler(
        workers: usize,
        items: Vec<WorkItem>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Arc<JobState>, Vec<ItemOutcome>) {
        let state = Arc::new(JobState::new(items.len()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(workers).unwrap();
        scheduler
            .run(items, fetcher, None, Arc::clone(&state), tx)
            .await
            .unwrap();

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        (state, outcomes)
    }

    #[test]
    fn test_scheduler_rejects_zero_workers() {
        assert!(matches!(
            Scheduler::new(0),
            Err(SchedulerError::InvalidWorkers { value: 0 })
        ));
    }

    #[test]
    fn test_scheduler_rejects_oversized_pool() {
        assert!(matches!(
            Scheduler::new(MAX_WORKERS + 1),
            Err(SchedulerError::InvalidWorkers { .. })
        ));
    }

    #[tokio::test]
    async fn test_exactly_one_outcome_per_item() {
        let temp = TempDir::new().unwrap();
        let items = test_items(temp.path(), 5);
        let stub = Arc::new(StubFetcher::new());

        let (state, outcomes) = run_scheduler(2, items, Arc::clone(&stub) as _).await;

        assert_eq!(outcomes.len(), 5, "one outcome per item, none dropped");
        let identifiers: HashSet<&str> =
            outcomes.iter().map(|o| o.identifier.as_str()).collect();
        assert_eq!(identifiers.len(), 5, "no duplicate outcomes");
        assert_eq!(state.completed(), 5);
        assert!(state.is_done());
    }

    #[tokio::test]
    async fn test_existing_files_skipped_without_fetch() {
        let temp = TempDir::new().unwrap();
        let items = test_items(temp.path(), 3);
        for item in &items {
            std::fs::write(&item.local_path, b"present").unwrap();
        }
        let stub = Arc::new(StubFetcher::new());

        let (state, outcomes) = run_scheduler(4, items, Arc::clone(&stub) as _).await;

        assert_eq!(stub.call_count(), 0, "no network access for present files");
        assert_eq!(state.completed(), 3);
        assert!(outcomes.iter().all(|o| matches!(
            &o.outcome,
            FetchOutcome::Skipped { reason } if reason == "already exists"
        )));
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_worker_bound() {
        let temp = TempDir::new().unwrap();
        let items = test_items(temp.path(), 12);
        let stub = Arc::new(StubFetcher::with_delay(Duration::from_millis(20)));

        let (_, outcomes) = run_scheduler(3, items, Arc::clone(&stub) as _).await;

        assert_eq!(outcomes.len(), 12);
        let max = stub.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "observed {max} concurrent fetches, bound is 3");
        assert!(max >= 2, "pool should actually run fetches in parallel");
    }

    #[tokio::test]
    async fn test_dispatch_follows_enumeration_order() {
        let temp = TempDir::new().unwrap();
        let items = test_items(temp.path(), 6);
        let expected: Vec<String> = items.iter().map(|i| i.identifier.clone()).collect();
        let stub = Arc::new(StubFetcher::new());

        // Single worker makes dispatch order observable in the call log
        run_scheduler(1, items, Arc::clone(&stub) as _).await;

        assert_eq!(*stub.calls.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_failures_do_not_halt_dispatch() {
        let temp = TempDir::new().unwrap();
        let items = test_items(temp.path(), 4);
        let stub = Arc::new(StubFetcher::failing(&["Official.zip.0002"]));

        let (state, outcomes) = run_scheduler(2, items, Arc::clone(&stub) as _).await;

        assert_eq!(state.completed(), 4, "failed item still counts as terminal");
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o.outcome, FetchOutcome::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].identifier, "Official.zip.0002");
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o.outcome, FetchOutcome::Downloaded { .. }))
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_download_only_phase_never_reports_extracted() {
        let temp = TempDir::new().unwrap();
        // Hand-built item with an archive name: extract_dest is None, so the
        // outcome must stay Downloaded
        let items = vec![WorkItem {
            identifier: "bundle.zip".to_string(),
            source_url: "https://cdn.example/bundle.zip".to_string(),
            local_path: temp.path().join("bundle.zip"),
        }];
        let stub = Arc::new(StubFetcher::new());

        let (_, outcomes) = run_scheduler(1, items, Arc::clone(&stub) as _).await;

        assert!(matches!(
            outcomes[0].outcome,
            FetchOutcome::Downloaded { bytes_written: 42 }
        ));
    }
}
