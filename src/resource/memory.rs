//! RAM ceiling gate.
//!
//! When the RAM limit is enabled, the gate samples current used memory and
//! blocks job start while usage is above the configured ceiling, emitting a
//! throttling notification on each sample. Hosts whose total memory is at or
//! below the ceiling skip the gate entirely: limiting would be meaningless.

use std::sync::Mutex;
use std::time::Duration;

use sysinfo::System;
use tracing::{debug, info};

/// Interval between memory samples while throttled.
pub const MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of host memory readings.
///
/// The production implementation is [`SysinfoSampler`]; tests substitute
/// scripted samplers to drive the gate deterministically.
pub trait MemorySampler: Send + Sync {
    /// Total physical memory of the host in bytes.
    fn total_memory(&self) -> u64;
    /// Currently used physical memory in bytes.
    fn used_memory(&self) -> u64;
}

/// [`MemorySampler`] backed by the `sysinfo` crate.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    /// Creates a sampler with a fresh system handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn total_memory(&self) -> u64 {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_memory();
        system.total_memory()
    }

    fn used_memory(&self) -> u64 {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_memory();
        system.used_memory()
    }
}

/// Blocks until used memory is at or below `ceiling_bytes`.
///
/// Returns immediately when the limit is inapplicable (host total memory at
/// or below the ceiling). Otherwise samples used memory every
/// [`MEMORY_POLL_INTERVAL`], calling `on_throttle` once per sample that is
/// still over the ceiling.
pub async fn wait_for_memory_budget<S>(sampler: &S, ceiling_bytes: u64, on_throttle: impl FnMut())
where
    S: MemorySampler + ?Sized,
{
    wait_for_memory_budget_with_interval(sampler, ceiling_bytes, MEMORY_POLL_INTERVAL, on_throttle)
        .await;
}

/// [`wait_for_memory_budget`] with an explicit poll interval.
pub async fn wait_for_memory_budget_with_interval<S>(
    sampler: &S,
    ceiling_bytes: u64,
    interval: Duration,
    mut on_throttle: impl FnMut(),
) where
    S: MemorySampler + ?Sized,
{
    let total = sampler.total_memory();
    if total <= ceiling_bytes {
        debug!(
            total,
            ceiling = ceiling_bytes,
            "host memory at or below ceiling, gate inapplicable"
        );
        return;
    }

    info!(ceiling = ceiling_bytes, "memory gate armed");

    loop {
        let used = sampler.used_memory();
        if used <= ceiling_bytes {
            debug!(used, ceiling = ceiling_bytes, "memory under ceiling");
            return;
        }
        debug!(used, ceiling = ceiling_bytes, "memory over ceiling, waiting");
        on_throttle();
        tokio::time::sleep(interval).await;
    }
}
