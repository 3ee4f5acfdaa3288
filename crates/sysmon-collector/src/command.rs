use crate::MetricSource;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use sysmon_common::types::Fields;

/// Argument passed to external plugins on every sample.
pub const REPORT_ARG: &str = "report";

/// A plugin implemented as an external executable.
///
/// On every sample the executable is run as `<path> report`. It must exit
/// with status 0 and print one JSON object on stdout whose values are
/// numbers, strings or booleans, e.g. `{"coretemp": 47.2, "fan_on": true}`.
/// Keys become report fields as-is.
pub struct CommandSource {
    name: String,
    path: PathBuf,
}

impl CommandSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

fn parse_output(stdout: &[u8]) -> Result<Fields> {
    let fields: Fields =
        serde_json::from_slice(stdout).context("plugin output is not a JSON object of numbers, strings and booleans")?;
    Ok(fields)
}

impl MetricSource for CommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&mut self) -> Result<Fields> {
        let output = Command::new(&self.path)
            .arg(REPORT_ARG)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run plugin {}", self.path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "plugin exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        parse_output(&output.stdout)
    }
}
