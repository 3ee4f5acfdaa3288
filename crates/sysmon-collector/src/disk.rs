use crate::{percent, to_gib, MetricSource};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use sysmon_common::types::Fields;

/// Usage of the filesystem that holds one configured path: `disk_used`,
/// `disk_free`, `disk_total` in GiB, plus `disk_usedpercent`.
///
/// The path is queried directly with `statvfs`, so virtual filesystems such
/// as tmpfs or overlay report their own usage.
pub struct DiskSource {
    path: PathBuf,
}

impl DiskSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Byte counts derived from one `statvfs` result.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DiskUsage {
    total: u64,
    /// Space available to unprivileged users.
    free: u64,
    /// Allocated blocks; reserved blocks are not counted.
    used: u64,
}

impl DiskUsage {
    fn from_stats(total: u64, unreserved_free: u64, available: u64) -> Self {
        Self {
            total,
            free: available,
            used: total.saturating_sub(unreserved_free),
        }
    }

    /// Share of the space usable by unprivileged users that is taken.
    fn used_percent(&self) -> f64 {
        percent(self.used, self.used + self.free)
    }

    fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("disk_used".to_string(), to_gib(self.used).into());
        fields.insert("disk_free".to_string(), to_gib(self.free).into());
        fields.insert("disk_total".to_string(), to_gib(self.total).into());
        fields.insert("disk_usedpercent".to_string(), self.used_percent().into());
        fields
    }
}

impl MetricSource for DiskSource {
    fn name(&self) -> &str {
        "disk"
    }

    fn sample(&mut self) -> Result<Fields> {
        let stats = fs2::statvfs(&self.path).map_err(|e| {
            anyhow!(
                "Failed to retrieve disk usage for {}: {e}",
                self.path.display()
            )
        })?;

        let usage = DiskUsage::from_stats(
            stats.total_space(),
            stats.free_space(),
            stats.available_space(),
        );

        tracing::trace!(
            path = %self.path.display(),
            total = usage.total,
            free = usage.free,
            used = usage.used,
            "Disk usage sampled"
        );

        Ok(usage.into_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysmon_common::types::MetricValue;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn reserved_blocks_are_not_used_space() {
        // 100 GiB volume, 40 GiB unallocated of which 5 GiB are reserved.
        let usage = DiskUsage::from_stats(100 * GIB, 40 * GIB, 35 * GIB);
        assert_eq!(usage.used, 60 * GIB);
        assert_eq!(usage.free, 35 * GIB);

        let fields = usage.into_fields();
        assert_eq!(fields["disk_used"], MetricValue::Float(60.0));
        assert_eq!(fields["disk_free"], MetricValue::Float(35.0));
        assert_eq!(fields["disk_total"], MetricValue::Float(100.0));
        // 60 / (60 + 35)
        match fields["disk_usedpercent"] {
            MetricValue::Float(p) => assert!((p - 63.157).abs() < 0.01),
            ref other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn empty_filesystem_reports_zero_percent() {
        let usage = DiskUsage::from_stats(0, 0, 0);
        assert_eq!(usage.used_percent(), 0.0);
    }

    #[test]
    fn missing_path_is_reported() {
        let mut source = DiskSource::new("/definitely/not/a/mounted/path");
        let err = source.sample().unwrap_err();
        assert!(err.to_string().contains("/definitely/not/a/mounted/path"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reports_the_filesystem_of_a_non_root_mount() {
        // /dev/shm is a tmpfs on practically every Linux host.
        let shm = std::path::Path::new("/dev/shm");
        if !shm.is_dir() {
            return;
        }
        let expected = fs2::statvfs(shm).unwrap();

        let fields = DiskSource::new(shm).sample().unwrap();
        assert_eq!(
            fields["disk_total"],
            MetricValue::Float(to_gib(expected.total_space()))
        );

        let root = fs2::statvfs("/").unwrap();
        if root.total_space() != expected.total_space() {
            let root_fields = DiskSource::new("/").sample().unwrap();
            assert_ne!(root_fields["disk_total"], fields["disk_total"]);
        }
    }

    #[test]
    fn any_path_on_the_filesystem_works() {
        let dir = tempfile::TempDir::new().unwrap();
        let fields = DiskSource::new(dir.path()).sample().unwrap();
        assert_eq!(fields.len(), 4);
        assert!(fields.contains_key("disk_usedpercent"));
    }
}
