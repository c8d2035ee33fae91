//! Resource guard: disk-space precheck and RAM ceiling gate.
//!
//! The disk check runs exactly once before any work item is dispatched and is
//! the only job-fatal error in the orchestrator. The memory gate is a
//! cooperative polling loop invoked once before the worker pool starts; it
//! bounds job startup, not steady-state throughput.

mod disk;
mod memory;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

pub use disk::available_space;
pub use memory::{MEMORY_POLL_INTERVAL, MemorySampler, SysinfoSampler, wait_for_memory_budget};

/// Errors from resource guard checks.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Free space at the download directory is below the configured minimum.
    #[error(
        "insufficient disk space at {path}: {available} bytes available, {required} bytes required"
    )]
    InsufficientSpace {
        /// Filesystem path that was checked.
        path: PathBuf,
        /// Bytes required by configuration.
        required: u64,
        /// Bytes actually available.
        available: u64,
    },

    /// The free-space query itself failed.
    #[error("failed to query free space at {path}: {source}")]
    Probe {
        /// Filesystem path that was probed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Checks that at least `min_bytes` are free at `path`.
///
/// Runs once, before any work item is dispatched. Failure aborts the whole
/// job with no items dispatched.
///
/// # Errors
///
/// Returns [`ResourceError::InsufficientSpace`] when free space is below
/// `min_bytes`, or [`ResourceError::Probe`] when the OS query fails.
pub fn check_disk_space(path: &Path, min_bytes: u64) -> Result<(), ResourceError> {
    check_disk_space_with(path, min_bytes, available_space)
}

/// [`check_disk_space`] with an injectable free-space probe.
///
/// # Errors
///
/// Same as [`check_disk_space`].
pub fn check_disk_space_with<F>(path: &Path, min_bytes: u64, probe: F) -> Result<(), ResourceError>
where
    F: Fn(&Path) -> std::io::Result<u64>,
{
    let available = probe(path).map_err(|source| ResourceError::Probe {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(
        path = %path.display(),
        available,
        required = min_bytes,
        "disk space probed"
    );

    if available < min_bytes {
        return Err(ResourceError::InsufficientSpace {
            path: path.to_path_buf(),
            required: min_bytes,
            available,
        });
    }

    info!(
        path = %path.display(),
        available_gib = available / (1024 * 1024 * 1024),
        "disk space check passed"
    );
    Ok(())
}
