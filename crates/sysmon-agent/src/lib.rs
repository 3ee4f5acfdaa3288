//! Periodic host telemetry reporter.
//!
//! The [`orchestrator::Orchestrator`] samples every registered metric source
//! on a runtime-adjustable interval and publishes the merged report field by
//! field through a [`publisher::Publisher`]. Inbound `trigger` and `interval`
//! commands arrive over MQTT ([`mqtt`]); process signals stop the loop
//! ([`signal`]).

pub mod config;
pub mod mqtt;
pub mod orchestrator;
pub mod publisher;
pub mod signal;

use config::SourcesConfig;
use sysmon_collector::disk::DiskSource;
use sysmon_collector::load::LoadSource;
use sysmon_collector::memory::MemorySource;
use sysmon_collector::network::NetworkSource;
use sysmon_collector::plugin::discover_plugins;
use sysmon_collector::registry::SourceRegistry;

/// Registers the enabled built-in sources, then every plugin that resolves.
pub fn build_registry(sources: &SourcesConfig) -> SourceRegistry {
    let mut registry = SourceRegistry::new();

    if sources.memory {
        registry.register(Box::new(MemorySource::new()));
    }
    if sources.disk {
        registry.register(Box::new(DiskSource::new(&sources.disk_path)));
    }
    if sources.load {
        registry.register(Box::new(LoadSource::new()));
    }
    if sources.network {
        registry.register(Box::new(NetworkSource::new()));
    }
    for plugin in discover_plugins(&sources.plugin_entries()) {
        registry.register(plugin);
    }

    registry
}
