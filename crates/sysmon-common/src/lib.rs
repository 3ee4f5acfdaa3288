//! Shared data model for the sysmon agent workspace.
//!
//! [`types`] holds the values exchanged between metric sources, the source
//! registry and the publisher. [`duration`] implements the duration syntax
//! used on the `interval` topic (`90s`, `1h45m`, `1.5m`).

pub mod duration;
pub mod types;

/// Logical topic names relative to the transport prefix.
pub mod topics {
    /// Inbound: any payload forces one immediate report.
    pub const TRIGGER: &str = "trigger";
    /// Inbound interval change requests, outbound interval announcements.
    pub const INTERVAL: &str = "interval";
    /// Outbound diagnostics for failed sources and rejected reconfigurations.
    pub const ERROR: &str = "error";
}
