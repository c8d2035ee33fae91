//! CLI entry point for the part fetcher.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use partfetch_core::config::{FileConfig, load_file_config};
use partfetch_core::manifest::Manifest;
use partfetch_core::progress::ProgressObserver;
use partfetch_core::Job;
use tracing::{debug, info};

mod cli;

use cli::Args;

/// [`ProgressObserver`] rendering outcome lines and a percentage bar on the
/// console.
struct ConsoleObserver {
    bar: ProgressBar,
    quiet: bool,
}

impl ConsoleObserver {
    fn new(total: u64, quiet: bool) -> Result<Self> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(ProgressStyle::with_template(
                "[{bar:40.cyan/blue}] {pos}% ({msg})",
            )?);
            bar.set_message(format!("{total} parts"));
            bar
        };
        Ok(Self { bar, quiet })
    }
}

impl ProgressObserver for ConsoleObserver {
    fn on_log_line(&self, line: &str) {
        if !self.quiet {
            // println through the bar so lines land above it
            self.bar.println(line);
        }
    }

    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let file = match &args.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };
    let quiet = args.quiet;
    let settings = args.resolve(file);
    debug!(?settings, "settings resolved");

    let manifest = Manifest::new(
        settings.base_url,
        settings.prefix,
        settings.count,
        settings.download_dir,
    );

    let observer = Arc::new(ConsoleObserver::new(u64::from(manifest.count()), quiet)?);
    let job = Job::new(&manifest, settings.job, settings.limits, observer.clone());

    let report = job.run().await?;
    observer.bar.finish_and_clear();

    info!(?report, "run complete");
    if !quiet {
        println!(
            "Done: {} total, {} downloaded, {} extracted, {} skipped, {} failed",
            report.total, report.downloaded, report.extracted, report.skipped, report.failed
        );
    }

    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
