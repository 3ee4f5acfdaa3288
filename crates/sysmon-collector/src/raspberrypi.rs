use crate::plugin::{lookup_executable, DiscoveryError};
use crate::MetricSource;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use sysmon_common::types::Fields;

const VCGENCMD: &str = "vcgencmd";

/// Raspberry Pi SoC temperature (`coretemp`, degrees Celsius) read through
/// `vcgencmd measure_temp`.
pub struct RaspberryPiSource {
    command: PathBuf,
}

impl RaspberryPiSource {
    /// Resolves `vcgencmd` on `PATH`. Hosts without it cannot load this plugin.
    pub fn discover() -> Result<Self, DiscoveryError> {
        let command = lookup_executable(VCGENCMD)
            .ok_or_else(|| DiscoveryError::CommandNotFound(VCGENCMD.to_string()))?;
        Ok(Self { command })
    }
}

/// Parses `temp=47.2'C`.
fn parse_temperature(output: &str) -> Option<f64> {
    let (_, reading) = output.trim().split_once('=')?;
    let (value, _unit) = reading.split_once('\'')?;
    value.parse().ok()
}

impl MetricSource for RaspberryPiSource {
    fn name(&self) -> &str {
        "raspberrypi"
    }

    fn sample(&mut self) -> Result<Fields> {
        let output = Command::new(&self.command)
            .arg("measure_temp")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.command.display()))?;
        if !output.status.success() {
            bail!("vcgencmd command returned bad exit status ({})", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let temp = parse_temperature(&stdout)
            .with_context(|| format!("Failed to parse vcgencmd output {:?}", stdout.trim()))?;

        let mut fields = Fields::new();
        fields.insert("coretemp".to_string(), temp.into());
        Ok(fields)
    }
}
