//! Resource limits and optional TOML file configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::job::InstallMode;

/// Minimum free disk space required at the download directory (600 GiB).
pub const DEFAULT_MIN_FREE_DISK_BYTES: u64 = 600 * 1024 * 1024 * 1024;

/// Default RAM ceiling when the limit is enabled (8 GiB).
pub const DEFAULT_MEMORY_CEILING_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Default worker pool size.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default streaming chunk size (8 KiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 8 * 1024;

/// Configuration snapshot taken once at job start.
///
/// Immutable for the job's duration; workers never re-read it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Free space required at the download directory before any dispatch.
    pub min_free_disk_bytes: u64,
    /// RAM ceiling the memory gate waits under; `None` disables the gate.
    pub memory_ceiling_bytes: Option<u64>,
    /// Maximum number of concurrently executing fetches.
    pub max_concurrent_workers: usize,
    /// Buffer size used when streaming a response body to disk.
    pub chunk_size_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            min_free_disk_bytes: DEFAULT_MIN_FREE_DISK_BYTES,
            memory_ceiling_bytes: None,
            max_concurrent_workers: DEFAULT_MAX_WORKERS,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
        }
    }
}

/// TOML-backed file configuration for CLI defaults.
///
/// Every field is optional; CLI flags win over file values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Base URL the part names are appended to.
    pub base_url: Option<String>,
    /// Part-name prefix.
    pub prefix: Option<String>,
    /// Number of parts to fetch.
    pub count: Option<u32>,
    /// Directory downloaded parts are written to.
    pub download_dir: Option<PathBuf>,
    /// Destination directory archives are extracted into.
    pub destination: Option<PathBuf>,
    /// Worker pool size.
    pub workers: Option<usize>,
    /// Enable the RAM ceiling gate.
    pub ram_limit: Option<bool>,
    /// RAM ceiling in bytes when the gate is enabled.
    pub memory_ceiling_bytes: Option<u64>,
    /// Required free disk space in bytes.
    pub min_free_disk_bytes: Option<u64>,
    /// Pipeline mode (kebab-case, e.g. `download-all-then-install`).
    pub mode: Option<InstallMode>,
}

/// Errors loading the optional config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`FileConfig`].
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Loads a [`FileConfig`] from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_limits_defaults() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.min_free_disk_bytes, 600 * 1024 * 1024 * 1024);
        assert_eq!(limits.memory_ceiling_bytes, None);
        assert_eq!(limits.max_concurrent_workers, 4);
        assert_eq!(limits.chunk_size_bytes, 8192);
    }

    #[test]
    fn test_file_config_parses_partial_toml() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "base_url = \"https://cdn.example/store/\"\nworkers = 8\nram_limit = true\n",
        )
        .unwrap();

        let config = load_file_config(&path).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://cdn.example/store/"));
        assert_eq!(config.workers, Some(8));
        assert_eq!(config.ram_limit, Some(true));
        assert!(config.count.is_none());
    }

    #[test]
    fn test_file_config_parses_mode() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "mode = \"download-all-then-install\"\n").unwrap();

        let config = load_file_config(&path).unwrap();
        assert_eq!(config.mode, Some(InstallMode::DownloadAllThenInstall));
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "no_such_key = 1\n").unwrap();

        let result = load_file_config(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_file_config_missing_file_is_read_error() {
        let result = load_file_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_resource_limits_deserialize_with_defaults() {
        let limits: ResourceLimits = toml::from_str("max_concurrent_workers = 2").unwrap();
        assert_eq!(limits.max_concurrent_workers, 2);
        assert_eq!(limits.chunk_size_bytes, DEFAULT_CHUNK_SIZE_BYTES);
    }
}
