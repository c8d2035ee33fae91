//! Streaming HTTP fetch and the bounded worker pool.
//!
//! [`PartClient`] streams one remote part to disk in fixed-size chunks so
//! memory use per in-flight download stays constant regardless of part size.
//! [`Scheduler`] runs a bounded number of concurrent fetch+extract pipelines
//! over the enumerated work list and reports one terminal outcome per item
//! over a result channel.

mod client;
mod constants;
mod error;
mod worker;

pub use client::PartClient;
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use worker::{
    FetchOutcome, Fetcher, ItemOutcome, MAX_WORKERS, MIN_WORKERS, Scheduler, SchedulerError,
};
