use crate::MetricSource;
use anyhow::Result;
use sysinfo::System;
use sysmon_common::types::Fields;

/// 1, 5 and 15 minute load averages, passed through unmodified.
pub struct LoadSource;

impl LoadSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for LoadSource {
    fn name(&self) -> &str {
        "load"
    }

    fn sample(&mut self) -> Result<Fields> {
        let load_avg = System::load_average();

        let mut fields = Fields::new();
        fields.insert("load_1min".to_string(), load_avg.one.into());
        fields.insert("load_5min".to_string(), load_avg.five.into());
        fields.insert("load_15min".to_string(), load_avg.fifteen.into());
        Ok(fields)
    }
}
