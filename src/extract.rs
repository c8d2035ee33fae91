//! ZIP archive expansion into the destination directory.
//!
//! Extraction is treated as a single atomic step by the orchestrator: either
//! all entries land in the destination or the operation is reported failed
//! and the downloaded archive is retained. Partial-entry accounting is the
//! archive library's concern, inherited as-is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from archive expansion.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive file could not be opened.
    #[error("failed to open archive {path}: {source}")]
    Open {
        /// Archive path that failed to open.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The file is not a readable ZIP archive.
    #[error("failed to read archive {path}: {reason}")]
    Malformed {
        /// Archive path that failed to parse.
        path: PathBuf,
        /// Detail from the ZIP reader.
        reason: String,
    },

    /// Writing an extracted entry failed.
    #[error("IO error extracting to {path}: {source}")]
    Io {
        /// Output path that failed to create or write.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Returns true when the part name denotes a ZIP archive.
///
/// Only a literal `.zip` extension counts; split parts such as
/// `Official.zip.0001` end in their sequence number and pass through the
/// pipeline as plain downloads.
#[must_use]
pub fn is_zip_archive(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Expands all entries of `archive_path` into `dest_dir`.
///
/// Creates the destination (and entry parent directories) as needed and
/// skips entries whose names escape the destination. Returns the number of
/// file entries written.
///
/// # Errors
///
/// Returns [`ExtractError`] when the archive cannot be opened or read, or
/// when writing an entry fails. The archive file itself is never removed.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<usize, ExtractError> {
    debug!(archive = %archive_path.display(), dest = %dest_dir.display(), "extracting archive");

    fs::create_dir_all(dest_dir).map_err(|source| ExtractError::Io {
        path: dest_dir.to_path_buf(),
        source,
    })?;

    let file = fs::File::open(archive_path).map_err(|source| ExtractError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| ExtractError::Malformed {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut extracted = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| ExtractError::Malformed {
            path: archive_path.to_path_buf(),
            reason: format!("failed to read entry {index}: {e}"),
        })?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(archive = %archive_path.display(), index, "skipping entry with unsafe path");
            continue;
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|source| ExtractError::Io {
                path: out_path.clone(),
                source,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|source| ExtractError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut out_file = fs::File::create(&out_path).map_err(|source| ExtractError::Io {
            path: out_path.clone(),
            source,
        })?;
        io::copy(&mut entry, &mut out_file).map_err(|source| ExtractError::Io {
            path: out_path.clone(),
            source,
        })?;
        extracted += 1;
    }

    info!(
        archive = %archive_path.display(),
        entries = extracted,
        "extraction complete"
    );
    Ok(extracted)
}
