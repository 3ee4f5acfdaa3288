use crate::MetricSource;
use std::panic::{self, AssertUnwindSafe};
use sysmon_common::types::{Report, SourceFailure};

/// Ordered set of active metric sources.
///
/// Sources are sampled in registration order. When two sources emit the
/// same field name, the one registered later wins.
///
/// # Examples
///
/// ```
/// use sysmon_collector::load::LoadSource;
/// use sysmon_collector::registry::SourceRegistry;
///
/// let mut registry = SourceRegistry::new();
/// registry.register(Box::new(LoadSource::new()));
/// assert_eq!(registry.source_names(), vec!["load"]);
/// ```
pub struct SourceRegistry {
    sources: Vec<Box<dyn MetricSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Box<dyn MetricSource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Samples every source and merges the results.
    ///
    /// A source that fails (or panics) contributes one [`SourceFailure`]
    /// instead of its fields; the remaining sources are still sampled.
    pub fn produce_report(&mut self) -> Report {
        let mut report = Report::new();

        for source in &mut self.sources {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.sample()));
            let name = source.name();

            match outcome {
                Ok(Ok(fields)) => {
                    tracing::debug!(source = name, count = fields.len(), "Source sampled");
                    for field in report.merge(fields) {
                        tracing::debug!(source = name, field = %field, "Field overwritten by later source");
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = name, error = %e, "Source sampling failed");
                    report.record_failure(SourceFailure::new(name, format!("{e:#}")));
                }
                Err(_) => {
                    tracing::error!(source = name, "Source panicked while sampling");
                    report.record_failure(SourceFailure::new(name, "source panicked while sampling"));
                }
            }
        }

        report
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
