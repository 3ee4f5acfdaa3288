use crate::MetricSource;
use anyhow::Result;
use sysinfo::Networks;
use sysmon_common::types::{Fields, MetricValue};

const FIELD_PREFIX: &str = "net_";

/// Cumulative per-interface counters, namespaced as `net_<iface>_<counter>`.
pub struct NetworkSource {
    networks: Networks,
}

impl NetworkSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters reported for one interface.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct InterfaceCounters {
    bytes_recv: u64,
    bytes_sent: u64,
    packets_recv: u64,
    packets_sent: u64,
    err_in: u64,
    err_out: u64,
    drop_in: u64,
    drop_out: u64,
}

impl InterfaceCounters {
    fn write_fields(&self, interface: &str, fields: &mut Fields) {
        let counters = [
            ("bytesrecv", self.bytes_recv),
            ("bytessend", self.bytes_sent),
            ("packetsrecv", self.packets_recv),
            ("packetssent", self.packets_sent),
            ("errin", self.err_in),
            ("errout", self.err_out),
            ("dropin", self.drop_in),
            ("dropout", self.drop_out),
        ];
        for (counter, value) in counters {
            fields.insert(
                format!("{FIELD_PREFIX}{interface}_{counter}"),
                MetricValue::Int(value),
            );
        }
    }
}

/// Drop counters are not exposed by `sysinfo`; Linux has them in sysfs.
#[cfg(target_os = "linux")]
fn drop_counters(interface: &str) -> (u64, u64) {
    let read = |name: &str| {
        std::fs::read_to_string(format!("/sys/class/net/{interface}/statistics/{name}"))
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };
    (read("rx_dropped"), read("tx_dropped"))
}

#[cfg(not(target_os = "linux"))]
fn drop_counters(_interface: &str) -> (u64, u64) {
    (0, 0)
}

impl MetricSource for NetworkSource {
    fn name(&self) -> &str {
        "network"
    }

    fn sample(&mut self) -> Result<Fields> {
        self.networks.refresh_list();
        let mut fields = Fields::new();

        for (name, data) in self.networks.iter() {
            let (drop_in, drop_out) = drop_counters(name);
            let counters = InterfaceCounters {
                bytes_recv: data.total_received(),
                bytes_sent: data.total_transmitted(),
                packets_recv: data.total_packets_received(),
                packets_sent: data.total_packets_transmitted(),
                err_in: data.total_errors_on_received(),
                err_out: data.total_errors_on_transmitted(),
                drop_in,
                drop_out,
            };
            counters.write_fields(name, &mut fields);
        }

        Ok(fields)
    }
}
