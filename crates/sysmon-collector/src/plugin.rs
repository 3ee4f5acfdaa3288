//! Plugin discovery.
//!
//! The plugin list is resolved once at startup. An entry is either the name
//! of a plugin compiled into the agent (`network`, `raspberrypi`) or a path
//! to an executable implementing the [`CommandSource`] contract. Relative
//! executables must contain a path separator (`./ups.sh`). An entry that
//! cannot be resolved is dropped for the lifetime of the process.

use crate::command::CommandSource;
use crate::network::NetworkSource;
use crate::raspberrypi::RaspberryPiSource;
use crate::MetricSource;
use std::path::{Path, PathBuf};

/// Plugins compiled into the agent, selectable by name.
pub const BUILTIN_PLUGINS: &[&str] = &["network", "raspberrypi"];

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("unknown plugin \"{0}\" (built-in plugins: network, raspberrypi)")]
    UnknownPlugin(String),

    #[error("plugin {0} does not exist")]
    NotFound(PathBuf),

    #[error("plugin {0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("plugin {0} is not executable")]
    NotExecutable(PathBuf),

    #[error("command \"{0}\" not found on PATH")]
    CommandNotFound(String),

    #[error("failed to inspect plugin {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Splits a semicolon separated plugin list, ignoring empty entries.
///
/// # Examples
///
/// ```
/// use sysmon_collector::plugin::split_plugin_list;
///
/// assert_eq!(split_plugin_list("network; ;/opt/ups.sh;"), vec!["network", "/opt/ups.sh"]);
/// assert!(split_plugin_list("  ").is_empty());
/// ```
pub fn split_plugin_list(list: &str) -> Vec<String> {
    list.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_path_entry(entry: &str) -> bool {
    entry.contains('/') || entry.contains(std::path::MAIN_SEPARATOR)
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

fn check_executable(path: &Path) -> Result<(), DiscoveryError> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DiscoveryError::NotFound(path.to_path_buf()),
        _ => DiscoveryError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    if !metadata.is_file() {
        return Err(DiscoveryError::NotAFile(path.to_path_buf()));
    }
    if !is_executable(&metadata) {
        return Err(DiscoveryError::NotExecutable(path.to_path_buf()));
    }
    Ok(())
}

/// Finds an executable named `name` in the directories listed in `PATH`.
pub(crate) fn lookup_executable(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| check_executable(candidate).is_ok())
}

/// Resolves one plugin list entry into a metric source.
pub fn resolve_plugin(entry: &str) -> Result<Box<dyn MetricSource>, DiscoveryError> {
    if is_path_entry(entry) {
        let path = PathBuf::from(entry);
        check_executable(&path)?;
        return Ok(Box::new(CommandSource::new(path)));
    }

    match entry {
        "network" => Ok(Box::new(NetworkSource::new())),
        "raspberrypi" => Ok(Box::new(RaspberryPiSource::discover()?)),
        other => Err(DiscoveryError::UnknownPlugin(other.to_string())),
    }
}

/// Resolves every entry in order, skipping (and logging) the ones that fail.
pub fn discover_plugins(entries: &[String]) -> Vec<Box<dyn MetricSource>> {
    let mut sources = Vec::with_capacity(entries.len());
    for entry in entries {
        match resolve_plugin(entry) {
            Ok(source) => {
                tracing::info!(plugin = %entry, source = source.name(), "Loaded plugin");
                sources.push(source);
            }
            Err(e) => {
                tracing::warn!(plugin = %entry, error = %e, "Failed to load plugin, skipping");
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_resolve() {
        let source = resolve_plugin("network").unwrap();
        assert_eq!(source.name(), "network");
        assert!(BUILTIN_PLUGINS.contains(&"network"));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = resolve_plugin("gpu").err().unwrap();
        assert!(matches!(err, DiscoveryError::UnknownPlugin(ref name) if name == "gpu"));
    }

    #[test]
    fn missing_files_are_rejected() {
        let err = resolve_plugin("/no/such/plugin.sh").err().unwrap();
        assert!(matches!(err, DiscoveryError::NotFound(_)));
    }

    #[test]
    fn directories_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let entry = dir.path().to_string_lossy().into_owned();
        let err = resolve_plugin(&entry).err().unwrap();
        assert!(matches!(err, DiscoveryError::NotAFile(_)));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_files_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "{}").unwrap();
        let err = resolve_plugin(&path.to_string_lossy()).err().unwrap();
        assert!(matches!(err, DiscoveryError::NotExecutable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn discovery_keeps_going_after_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = crate::testing::write_script(dir.path(), "ups.sh", "echo '{}'\n");

        let entries = vec![
            "gpu".to_string(),
            "/no/such/plugin".to_string(),
            path.to_string_lossy().into_owned(),
            "network".to_string(),
        ];
        let sources = discover_plugins(&entries);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["ups", "network"]);
    }
}
