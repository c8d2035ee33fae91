//! Deterministic enumeration of the remote part sequence.
//!
//! The remote store serves a fixed, numbered sequence of archive parts named
//! `{prefix}.zip.{NNNN}` with a zero-padded sequence number starting at 1.
//! The manifest regenerates the identical sequence on every call, so a job
//! can be restarted after an interruption and re-enumerate the same work.

use std::path::PathBuf;

/// Base URL of the published part store. Part names are appended verbatim,
/// with no separator inserted.
pub const DEFAULT_BASE_URL: &str = "https://msfs.b-cdn.net/msfs/Official";

/// Reference number of parts in the published sequence.
pub const DEFAULT_PART_COUNT: u32 = 2407;

/// Upper bound on the part sequence accepted from configuration.
pub const MAX_PART_COUNT: u32 = 5120;

/// Default part-name prefix.
pub const DEFAULT_PREFIX: &str = "Official";

/// Width of the zero-padded sequence number.
pub const DEFAULT_SEQUENCE_DIGITS: usize = 4;

/// One remote object to fetch.
///
/// Items are generated by the [`Manifest`], never user-supplied, and are
/// immutable once enumerated. Each item is consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Generated part name, e.g. `Official.zip.0001`.
    pub identifier: String,
    /// Fully resolved remote URL for the part.
    pub source_url: String,
    /// Local path the part is written to (download dir + identifier).
    pub local_path: PathBuf,
}

/// Generator for the ordered list of remote parts.
///
/// Enumeration order is the dispatch priority hint only; completion order is
/// not guaranteed to match it.
#[derive(Debug, Clone)]
pub struct Manifest {
    base_url: String,
    prefix: String,
    digits: usize,
    count: u32,
    download_dir: PathBuf,
}

impl Manifest {
    /// Creates a manifest for `count` parts named `{prefix}.zip.{seq}`.
    ///
    /// `base_url` is concatenated with the part name verbatim to form the
    /// remote URL, so it must carry its own trailing separator. The count is
    /// clamped to [`MAX_PART_COUNT`].
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        prefix: impl Into<String>,
        count: u32,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            prefix: prefix.into(),
            digits: DEFAULT_SEQUENCE_DIGITS,
            count: count.min(MAX_PART_COUNT),
            download_dir: download_dir.into(),
        }
    }

    /// Number of parts the manifest enumerates.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Directory the parts are downloaded into.
    #[must_use]
    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    /// Generates the full ordered sequence of work items.
    ///
    /// Finite, deterministic, and restartable: calling this again produces an
    /// identical sequence.
    #[must_use]
    pub fn items(&self) -> Vec<WorkItem> {
        (1..=self.count)
            .map(|seq| {
                let identifier = format!(
                    "{prefix}.zip.{seq:0width$}",
                    prefix = self.prefix,
                    width = self.digits
                );
                WorkItem {
                    source_url: format!("{}{}", self.base_url, identifier),
                    local_path: self.download_dir.join(&identifier),
                    identifier,
                }
            })
            .collect()
    }
}
