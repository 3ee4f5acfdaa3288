//! Metric sources for the sysmon agent.
//!
//! Each [`MetricSource`] implementation samples one category of host
//! metrics (memory, disk, load, network) or one plugin, and returns its
//! values as named [`Fields`]. The [`registry::SourceRegistry`] samples every
//! registered source and merges the results into one report per cycle.

pub mod command;
pub mod disk;
pub mod load;
pub mod memory;
pub mod network;
pub mod plugin;
pub mod raspberrypi;
pub mod registry;

use anyhow::Result;
use sysmon_common::types::Fields;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A capability that produces a set of named measurements.
///
/// Sources are sampled one after another from the reporter's control loop,
/// so `sample` must be synchronous and must not leave background work
/// running once it returns. The trait requires `Send + Sync` so the registry
/// can live inside the reporter task.
pub trait MetricSource: Send + Sync {
    /// Returns the source name (e.g., `"memory"`, `"disk"`), used to
    /// attribute failures and log entries.
    fn name(&self) -> &str;

    /// Samples the current values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system query or plugin invocation
    /// fails. The registry turns it into a diagnostic for this source only.
    fn sample(&mut self) -> Result<Fields>;
}

pub(crate) fn to_gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
