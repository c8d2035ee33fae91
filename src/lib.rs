//! Partfetch Core Library
//!
//! This library fetches a large, fixed-size set of remote archive parts over
//! HTTP with a bounded worker pool, skips parts already present on disk,
//! streams each part to disk without buffering it in memory, optionally
//! extracts ZIP archives into a destination directory, and reports per-item
//! outcomes plus overall completion percentage to an observer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`manifest`] - Deterministic enumeration of the remote part sequence
//! - [`resource`] - Disk-space precheck and RAM ceiling gate
//! - [`fetch`] - Streaming HTTP client and the bounded worker pool
//! - [`extract`] - ZIP archive expansion
//! - [`progress`] - Outcome aggregation and the observer interface
//! - [`job`] - Job lifecycle tying the above together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod extract;
pub mod fetch;
pub mod job;
pub mod manifest;
pub mod progress;
pub mod resource;

// Re-export commonly used types
pub use config::{
    DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_MAX_WORKERS, DEFAULT_MEMORY_CEILING_BYTES,
    DEFAULT_MIN_FREE_DISK_BYTES, FileConfig, ResourceLimits,
};
pub use extract::{ExtractError, extract_archive, is_zip_archive};
pub use fetch::{
    FetchError, FetchOutcome, Fetcher, ItemOutcome, PartClient, Scheduler, SchedulerError,
};
pub use job::{InstallMode, Job, JobConfig, JobError, JobReport, JobState};
pub use manifest::{DEFAULT_BASE_URL, DEFAULT_PART_COUNT, DEFAULT_PREFIX, Manifest, WorkItem};
pub use progress::{Aggregator, ProgressObserver};
pub use resource::{MemorySampler, ResourceError, SysinfoSampler};
