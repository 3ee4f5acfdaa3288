use crate::{percent, to_gib, MetricSource};
use anyhow::{bail, Result};
use sysinfo::System;
use sysmon_common::types::Fields;

/// Virtual memory usage in GiB: `mem_total`, `mem_available`, `mem_used`,
/// plus `mem_usedpercent`.
pub struct MemorySource {
    system: System,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn sample(&mut self) -> Result<Fields> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            bail!("Failed to retrieve memory usage: total memory reported as zero");
        }
        let available = self.system.available_memory();
        let used = self.system.used_memory();

        let mut fields = Fields::new();
        fields.insert("mem_total".to_string(), to_gib(total).into());
        fields.insert("mem_available".to_string(), to_gib(available).into());
        fields.insert("mem_used".to_string(), to_gib(used).into());
        fields.insert("mem_usedpercent".to_string(), percent(used, total).into());
        Ok(fields)
    }
}
