//! Job lifecycle: configuration, shared state, and the run-to-completion
//! orchestration.
//!
//! A [`Job`] owns one run over the enumerated work list. It performs the
//! disk-space precheck, optionally waits under the RAM ceiling, drives the
//! bounded worker pool, and feeds every terminal outcome to the aggregator.
//! Once started a job runs to completion over all items; cancellation is not
//! supported.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::config::ResourceLimits;
use crate::extract::{extract_archive, is_zip_archive};
use crate::fetch::{Fetcher, PartClient, Scheduler, SchedulerError};
use crate::manifest::{Manifest, WorkItem};
use crate::progress::{Aggregator, OutcomeTally, ProgressObserver};
use crate::resource::{
    self, MemorySampler, ResourceError, SysinfoSampler, wait_for_memory_budget,
};

const GIB: u64 = 1024 * 1024 * 1024;

/// Pipeline shape for archive parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMode {
    /// Each worker extracts an archive immediately after downloading it.
    #[default]
    ImmediateInstall,
    /// Two distinct phases: every part is fetched before any archive is
    /// extracted.
    DownloadAllThenInstall,
}

/// Job configuration supplied by the embedding shell.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Directory archives are extracted into; the download directory when
    /// unset.
    pub destination: Option<PathBuf>,
    /// Whether the RAM ceiling gate runs before dispatch.
    pub ram_limit_enabled: bool,
    /// Pipeline shape.
    pub mode: InstallMode,
}

/// Process-wide counters for one job run.
///
/// Total is fixed at enumeration time; completed increments exactly once per
/// terminal outcome and never decrements.
#[derive(Debug)]
pub struct JobState {
    total: usize,
    completed: AtomicUsize,
}

impl JobState {
    /// Creates state for a job over `total` items.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    /// Fixed item count.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Items that have reached a terminal outcome so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst).min(self.total)
    }

    /// Records one terminal outcome, returning the new completed count.
    pub fn increment_completed(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True once every item has a terminal outcome.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completed() == self.total
    }

    /// Completion percentage, floored, 0..=100.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed() * 100) / self.total) as u8
    }
}

/// Final counts for a completed job.
///
/// In two-phase mode `downloaded` covers the fetch phase and `extracted`
/// counts the archives expanded afterwards, so the two can overlap; `failed`
/// accumulates both phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Items enumerated for the job.
    pub total: usize,
    /// Items skipped because a local artifact already existed.
    pub skipped: usize,
    /// Items downloaded without extraction.
    pub downloaded: usize,
    /// Archives downloaded and extracted.
    pub extracted: usize,
    /// Fetches or extractions that failed.
    pub failed: usize,
}

/// Job-fatal errors.
///
/// Per-item fetch and extraction failures are reported as outcomes, never
/// through this type; only the disk-space precheck and orchestration wiring
/// can abort a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The disk precheck failed or could not run.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The worker pool could not be built or dispatched.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// A required directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// The directory that failed to create.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

type DiskProbe = Box<dyn Fn(&Path) -> io::Result<u64> + Send + Sync>;

/// One fetch-and-extract run over an enumerated work list.
pub struct Job {
    items: Vec<WorkItem>,
    download_dir: PathBuf,
    config: JobConfig,
    limits: ResourceLimits,
    observer: Arc<dyn ProgressObserver>,
    fetcher: Arc<dyn Fetcher>,
    memory_sampler: Arc<dyn MemorySampler>,
    disk_probe: DiskProbe,
}

impl Job {
    /// Creates a job over the manifest's enumerated sequence.
    #[must_use]
    pub fn new(
        manifest: &Manifest,
        config: JobConfig,
        limits: ResourceLimits,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let download_dir = manifest.download_dir().to_path_buf();
        Self::from_items(manifest.items(), download_dir, config, limits, observer)
    }

    /// Creates a job over an explicit item list.
    #[must_use]
    pub fn from_items(
        items: Vec<WorkItem>,
        download_dir: PathBuf,
        config: JobConfig,
        limits: ResourceLimits,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let client = PartClient::with_timeouts(
            crate::fetch::CONNECT_TIMEOUT_SECS,
            crate::fetch::READ_TIMEOUT_SECS,
            limits.chunk_size_bytes,
        );
        Self {
            items,
            download_dir,
            config,
            limits,
            observer,
            fetcher: Arc::new(client),
            memory_sampler: Arc::new(SysinfoSampler::new()),
            disk_probe: Box::new(resource::available_space),
        }
    }

    /// Substitutes the part fetcher (used by tests).
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Substitutes the memory sampler (used by tests).
    #[must_use]
    pub fn with_memory_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.memory_sampler = sampler;
        self
    }

    /// Substitutes the free-space probe (used by tests).
    #[must_use]
    pub fn with_disk_probe(
        mut self,
        probe: impl Fn(&Path) -> io::Result<u64> + Send + Sync + 'static,
    ) -> Self {
        self.disk_probe = Box::new(probe);
        self
    }

    /// Runs the job to completion over every enumerated item.
    ///
    /// The progress percentage reaches exactly 100 once all items have a
    /// terminal outcome, even when some failed.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] only for job-fatal conditions: directory
    /// creation, the disk-space precheck, or worker pool construction.
    #[instrument(skip(self), fields(items = self.items.len()))]
    pub async fn run(self) -> Result<JobReport, JobError> {
        let state = Arc::new(JobState::new(self.items.len()));
        let mut aggregator = Aggregator::new(Arc::clone(&self.observer), Arc::clone(&state));

        std::fs::create_dir_all(&self.download_dir).map_err(|source| JobError::CreateDir {
            path: self.download_dir.clone(),
            source,
        })?;

        aggregator.note("Checking disk space and RAM usage...");
        if let Err(e) = resource::check_disk_space_with(
            &self.download_dir,
            self.limits.min_free_disk_bytes,
            &self.disk_probe,
        ) {
            if matches!(e, ResourceError::InsufficientSpace { .. }) {
                aggregator.note(&format!(
                    "Insufficient disk space. At least {} GiB is required.",
                    self.limits.min_free_disk_bytes / GIB
                ));
            }
            return Err(e.into());
        }

        if self.config.ram_limit_enabled
            && let Some(ceiling) = self.limits.memory_ceiling_bytes
            && self.memory_sampler.total_memory() > ceiling
        {
            aggregator.note("RAM limit enabled. Monitoring memory usage...");
            wait_for_memory_budget(self.memory_sampler.as_ref(), ceiling, || {
                aggregator.note("High memory usage, waiting...");
            })
            .await;
        }

        let destination = self
            .config
            .destination
            .clone()
            .unwrap_or_else(|| self.download_dir.clone());

        let scheduler = Scheduler::new(self.limits.max_concurrent_workers)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let tally = match self.config.mode {
            InstallMode::ImmediateInstall => {
                let (run_result, tally) = tokio::join!(
                    scheduler.run(
                        self.items.clone(),
                        Arc::clone(&self.fetcher),
                        Some(destination.as_path()),
                        Arc::clone(&state),
                        tx,
                    ),
                    aggregator.drain(rx),
                );
                run_result?;
                tally
            }
            InstallMode::DownloadAllThenInstall => {
                // Phase one: fetch everything, no extraction
                let (run_result, tally) = tokio::join!(
                    scheduler.run(
                        self.items.clone(),
                        Arc::clone(&self.fetcher),
                        None,
                        Arc::clone(&state),
                        tx,
                    ),
                    aggregator.drain(rx),
                );
                run_result?;
                // Phase barrier: every fetch has a terminal outcome before
                // any archive is opened
                extract_phase(&self.items, &destination, &mut aggregator, tally).await
            }
        };

        let report = JobReport {
            total: state.total(),
            skipped: tally.skipped,
            downloaded: tally.downloaded,
            extracted: tally.extracted,
            failed: tally.failed,
        };
        info!(?report, "job complete");
        Ok(report)
    }
}

/// Second phase of `DownloadAllThenInstall`: expands every on-disk archive
/// into the destination, one at a time (the destination tree is shared).
async fn extract_phase(
    items: &[WorkItem],
    destination: &Path,
    aggregator: &mut Aggregator,
    mut tally: OutcomeTally,
) -> OutcomeTally {
    for item in items {
        if !is_zip_archive(&item.identifier) || !item.local_path.exists() {
            continue;
        }
        let archive = item.local_path.clone();
        let dest = destination.to_path_buf();
        let result = tokio::task::spawn_blocking(move || extract_archive(&archive, &dest)).await;
        match result {
            Ok(Ok(_)) => {
                aggregator.note(&format!("Extracted {}", item.identifier));
                tally.extracted += 1;
            }
            Ok(Err(e)) => {
                warn!(identifier = %item.identifier, error = %e, "extraction failed");
                aggregator.note(&format!("Failed to extract {}: {e}", item.identifier));
                tally.failed += 1;
            }
            Err(e) => {
                aggregator.note(&format!(
                    "Failed to extract {}: extraction task panicked: {e}",
                    item.identifier
                ));
                tally.failed += 1;
            }
        }
    }
    tally
}
