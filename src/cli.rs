//! CLI argument definitions using clap derive macros.
//!
//! Most flags are optional so that values from an optional TOML config file
//! can fill in underneath them; an explicit flag always wins over the file,
//! and built-in defaults apply last. The resolution itself lives in `main`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use partfetch_core::config::{
    DEFAULT_MAX_WORKERS, DEFAULT_MEMORY_CEILING_BYTES, DEFAULT_MIN_FREE_DISK_BYTES, FileConfig,
    ResourceLimits,
};
use partfetch_core::job::{InstallMode, JobConfig};
use partfetch_core::manifest::{
    DEFAULT_BASE_URL, DEFAULT_PART_COUNT, DEFAULT_PREFIX, MAX_PART_COUNT,
};

const GIB: u64 = 1024 * 1024 * 1024;

/// Fetch a numbered sequence of remote archive parts and extract them.
///
/// Parts already present in the download directory are skipped, so an
/// interrupted run can simply be started again.
#[derive(Parser, Debug)]
#[command(name = "partfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Base URL the part names are appended to verbatim [default: the
    /// published part store]
    #[arg(short = 'u', long)]
    pub base_url: Option<String>,

    /// Part-name prefix [default: Official]
    #[arg(short = 'p', long)]
    pub prefix: Option<String>,

    /// Number of parts to fetch [default: 2407]
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_PART_COUNT)))]
    pub count: Option<u32>,

    /// Directory downloaded parts are written to [default: downloads]
    #[arg(short = 'd', long)]
    pub download_dir: Option<PathBuf>,

    /// Destination directory archives are extracted into [default: the
    /// download directory]
    #[arg(short = 'o', long)]
    pub destination: Option<PathBuf>,

    /// Maximum concurrent downloads, 1-64 [default: 4]
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub workers: Option<u64>,

    /// Wait for host memory usage to drop under the ceiling before dispatch
    #[arg(long)]
    pub ram_limit: bool,

    /// RAM ceiling in GiB when the RAM limit is enabled [default: 8]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub ram_ceiling_gib: Option<u64>,

    /// Required free disk space in GiB at the download directory
    /// [default: 600]
    #[arg(long)]
    pub min_free_disk_gib: Option<u64>,

    /// Pipeline mode [default: immediate]
    #[arg(short = 'm', long, value_enum)]
    pub mode: Option<ModeArg>,

    /// TOML config file supplying defaults (explicit flags win)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// CLI-facing pipeline mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Extract each archive immediately after downloading it
    Immediate,
    /// Download every part first, then extract
    DownloadAll,
}

impl From<ModeArg> for InstallMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Immediate => InstallMode::ImmediateInstall,
            ModeArg::DownloadAll => InstallMode::DownloadAllThenInstall,
        }
    }
}

/// Fully resolved run settings after merging flags, file config, and
/// defaults.
#[derive(Debug)]
pub struct Settings {
    pub base_url: String,
    pub prefix: String,
    pub count: u32,
    pub download_dir: PathBuf,
    pub job: JobConfig,
    pub limits: ResourceLimits,
}

impl Args {
    /// Merges the parsed flags with `file` values: an explicit flag wins,
    /// then the file, then the built-in default.
    pub fn resolve(self, file: FileConfig) -> Settings {
        let ram_limit_enabled = self.ram_limit || file.ram_limit.unwrap_or(false);
        let memory_ceiling_bytes = self
            .ram_ceiling_gib
            .map(|gib| gib * GIB)
            .or(file.memory_ceiling_bytes)
            .unwrap_or(DEFAULT_MEMORY_CEILING_BYTES);

        Settings {
            base_url: self
                .base_url
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            prefix: self
                .prefix
                .or(file.prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            count: self.count.or(file.count).unwrap_or(DEFAULT_PART_COUNT),
            download_dir: self
                .download_dir
                .or(file.download_dir)
                .unwrap_or_else(|| PathBuf::from("downloads")),
            job: JobConfig {
                destination: self.destination.or(file.destination),
                ram_limit_enabled,
                mode: self
                    .mode
                    .map(InstallMode::from)
                    .or(file.mode)
                    .unwrap_or_default(),
            },
            limits: ResourceLimits {
                min_free_disk_bytes: self
                    .min_free_disk_gib
                    .map(|gib| gib * GIB)
                    .or(file.min_free_disk_bytes)
                    .unwrap_or(DEFAULT_MIN_FREE_DISK_BYTES),
                memory_ceiling_bytes: Some(memory_ceiling_bytes),
                max_concurrent_workers: self
                    .workers
                    .map(|w| w as usize)
                    .or(file.workers)
                    .unwrap_or(DEFAULT_MAX_WORKERS),
                ..ResourceLimits::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_no_args_parse_successfully() {
        let args = Args::try_parse_from(["partfetch"]).unwrap();
        assert!(args.base_url.is_none());
        assert!(args.count.is_none());
        assert!(args.workers.is_none());
        assert!(!args.ram_limit);
        assert!(!args.quiet);
        assert_eq!(args.verbose, 0);
        assert!(args.mode.is_none());
    }

    #[test]
    fn test_cli_base_url_flag() {
        let args =
            Args::try_parse_from(["partfetch", "--base-url", "https://cdn.example/store/"])
                .unwrap();
        assert_eq!(args.base_url.as_deref(), Some("https://cdn.example/store/"));
    }

    #[test]
    fn test_cli_workers_range_enforced() {
        assert!(Args::try_parse_from(["partfetch", "-j", "0"]).is_err());
        assert!(Args::try_parse_from(["partfetch", "-j", "65"]).is_err());
        let args = Args::try_parse_from(["partfetch", "-j", "64"]).unwrap();
        assert_eq!(args.workers, Some(64));
    }

    #[test]
    fn test_cli_count_rejects_zero_and_over_ceiling() {
        assert!(Args::try_parse_from(["partfetch", "-n", "0"]).is_err());
        assert!(Args::try_parse_from(["partfetch", "-n", "5121"]).is_err());
        let args = Args::try_parse_from(["partfetch", "-n", "5120"]).unwrap();
        assert_eq!(args.count, Some(5120));
    }

    #[test]
    fn test_cli_mode_values() {
        let args = Args::try_parse_from(["partfetch", "-m", "download-all"]).unwrap();
        assert_eq!(args.mode, Some(ModeArg::DownloadAll));
        assert_eq!(
            InstallMode::from(ModeArg::DownloadAll),
            InstallMode::DownloadAllThenInstall
        );
    }

    #[test]
    fn test_cli_ram_limit_flag_and_ceiling() {
        let args =
            Args::try_parse_from(["partfetch", "--ram-limit", "--ram-ceiling-gib", "16"]).unwrap();
        assert!(args.ram_limit);
        assert_eq!(args.ram_ceiling_gib, Some(16));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["partfetch", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["partfetch", "--help"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["partfetch", "--no-such-flag"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn test_resolve_defaults_when_nothing_is_set() {
        let args = Args::try_parse_from(["partfetch"]).unwrap();
        let settings = args.resolve(FileConfig::default());

        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.prefix, "Official");
        assert_eq!(settings.count, 2407);
        assert_eq!(settings.download_dir, PathBuf::from("downloads"));
        assert!(settings.job.destination.is_none());
        assert!(!settings.job.ram_limit_enabled);
        assert_eq!(settings.limits.max_concurrent_workers, 4);
        assert_eq!(settings.limits.min_free_disk_bytes, 600 * GIB);
        assert_eq!(settings.limits.memory_ceiling_bytes, Some(8 * GIB));
    }

    #[test]
    fn test_resolve_file_values_fill_in_under_flags() {
        let args = Args::try_parse_from(["partfetch", "-n", "10"]).unwrap();
        let file = FileConfig {
            count: Some(500),
            workers: Some(8),
            ram_limit: Some(true),
            ..FileConfig::default()
        };
        let settings = args.resolve(file);

        // explicit flag beats the file
        assert_eq!(settings.count, 10);
        // file beats the default
        assert_eq!(settings.limits.max_concurrent_workers, 8);
        assert!(settings.job.ram_limit_enabled);
    }

    #[test]
    fn test_resolve_ceiling_flag_converts_gib_to_bytes() {
        let args =
            Args::try_parse_from(["partfetch", "--ram-limit", "--ram-ceiling-gib", "16"]).unwrap();
        let settings = args.resolve(FileConfig::default());

        assert!(settings.job.ram_limit_enabled);
        assert_eq!(settings.limits.memory_ceiling_bytes, Some(16 * GIB));
    }

    #[test]
    fn test_resolve_min_free_disk_flag_converts_gib_to_bytes() {
        let args = Args::try_parse_from(["partfetch", "--min-free-disk-gib", "50"]).unwrap();
        let settings = args.resolve(FileConfig::default());
        assert_eq!(settings.limits.min_free_disk_bytes, 50 * GIB);
    }

    #[test]
    fn test_resolve_mode_precedence() {
        // file value fills in when the flag is absent
        let args = Args::try_parse_from(["partfetch"]).unwrap();
        let file = FileConfig {
            mode: Some(InstallMode::DownloadAllThenInstall),
            ..FileConfig::default()
        };
        assert_eq!(
            args.resolve(file).job.mode,
            InstallMode::DownloadAllThenInstall
        );

        // explicit flag beats the file
        let args = Args::try_parse_from(["partfetch", "-m", "immediate"]).unwrap();
        let file = FileConfig {
            mode: Some(InstallMode::DownloadAllThenInstall),
            ..FileConfig::default()
        };
        assert_eq!(args.resolve(file).job.mode, InstallMode::ImmediateInstall);

        // default applies when neither is set
        let args = Args::try_parse_from(["partfetch"]).unwrap();
        assert_eq!(
            args.resolve(FileConfig::default()).job.mode,
            InstallMode::ImmediateInstall
        );
    }

    #[test]
    fn test_resolve_destination_from_file() {
        let args = Args::try_parse_from(["partfetch"]).unwrap();
        let file = FileConfig {
            destination: Some(PathBuf::from("/opt/install")),
            ..FileConfig::default()
        };
        let settings = args.resolve(file);
        assert_eq!(settings.job.destination, Some(PathBuf::from("/opt/install")));
    }
}
