use serde::Deserialize;
use std::time::Duration;
use sysmon_collector::plugin::split_plugin_list;
use sysmon_common::duration::{parse_interval, DurationError};

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTTS_PORT: u16 = 8883;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("device_id must not be empty")]
    MissingDeviceId,

    #[error("invalid interval: {0}")]
    Interval(#[from] DurationError),

    #[error("invalid mqtt_server \"{0}\": expected tcp://host[:port] or tls://host[:port]")]
    Endpoint(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub device_id: String,
    /// Broker password; the device id is used as the user name.
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default = "default_mqtt_server")]
    pub mqtt_server: String,
    /// Topic prefix for outbound fields, defaults to `devices/<id>/telemetry`.
    #[serde(default)]
    pub telemetry_prefix: Option<String>,
    /// Topic prefix for `trigger` and `interval` commands, defaults to
    /// `devices/<id>/command`.
    #[serde(default)]
    pub command_prefix: Option<String>,
    /// Initial report interval, e.g. `60s` or `1h45m`.
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_true")]
    pub disk: bool,
    #[serde(default = "default_true")]
    pub load: bool,
    #[serde(default)]
    pub network: bool,
    /// Mount point (or any path on it) whose filesystem is reported.
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
    /// Plugin names or executable paths, in registration order.
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Semicolon separated plugin list, appended after `plugins`.
    #[serde(default)]
    pub plugin_paths: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            memory: true,
            disk: true,
            load: true,
            network: false,
            disk_path: default_disk_path(),
            plugins: Vec::new(),
            plugin_paths: String::new(),
        }
    }
}

impl SourcesConfig {
    /// All plugin entries in registration order, empty entries removed.
    pub fn plugin_entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .plugins
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        entries.extend(split_plugin_list(&self.plugin_paths));
        entries
    }
}

fn default_true() -> bool {
    true
}

fn default_mqtt_server() -> String {
    "tcp://localhost:1883".to_string()
}

fn default_interval() -> String {
    "60s".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_disk_path() -> String {
    "/".to_string()
}

/// Broker address parsed from `mqtt_server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{path}': {e}"))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{path}': {e}"))?;
        Ok(config)
    }

    /// Applies `DEVICE_ID`, `DEVICE_TOKEN`, `MQTT_SERVER`, `INTERVAL`,
    /// `DISK_PATH` and `PLUGIN_PATHS` from `lookup` over the file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = lookup("DEVICE_TOKEN") {
            self.device_token = Some(v);
        }
        if let Some(v) = lookup("MQTT_SERVER") {
            self.mqtt_server = v;
        }
        if let Some(v) = lookup("INTERVAL") {
            self.interval = v;
        }
        if let Some(v) = lookup("DISK_PATH") {
            self.sources.disk_path = v;
        }
        if let Some(v) = lookup("PLUGIN_PATHS") {
            self.sources.plugin_paths = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::MissingDeviceId);
        }
        self.interval()?;
        self.broker()?;
        Ok(())
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        Ok(parse_interval(&self.interval)?)
    }

    pub fn broker(&self) -> Result<BrokerAddress, ConfigError> {
        let raw = self.mqtt_server.trim();
        let invalid = || ConfigError::Endpoint(raw.to_string());

        let (tls, rest) = match raw.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => (false, rest),
            Some(("tls" | "ssl" | "mqtts", rest)) => (true, rest),
            Some(_) => return Err(invalid()),
            None => (false, raw),
        };
        let default_port = if tls { DEFAULT_MQTTS_PORT } else { DEFAULT_MQTT_PORT };

        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());
        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // IPv6 literal: [addr] or [addr]:port
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => default_port,
                _ => parse_port(tail.strip_prefix(':').ok_or_else(invalid)?)?,
            };
            (host, port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => return Err(invalid()),
                Some((host, port)) => (host, parse_port(port)?),
                None => (rest, default_port),
            }
        };
        if host.is_empty() || host.contains(['/', '[', ']']) {
            return Err(invalid());
        }

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
            tls,
        })
    }

    pub fn telemetry_prefix(&self) -> String {
        self.telemetry_prefix
            .as_deref()
            .map(|p| p.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("devices/{}/telemetry", self.device_id))
    }

    pub fn command_prefix(&self) -> String {
        self.command_prefix
            .as_deref()
            .map(|p| p.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("devices/{}/command", self.device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml_str: &str) -> AgentConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(r#"device_id = "pi-42""#);
        assert_eq!(config.interval().unwrap(), Duration::from_secs(60));
        assert_eq!(config.sources.disk_path, "/");
        assert!(config.sources.memory && config.sources.disk && config.sources.load);
        assert!(!config.sources.network);
        assert_eq!(config.telemetry_prefix(), "devices/pi-42/telemetry");
        assert_eq!(config.command_prefix(), "devices/pi-42/command");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config() {
        let config = parse(
            r#"
            device_id = "pi-42"
            device_token = "secret"
            mqtt_server = "tls://broker.example.com"
            telemetry_prefix = "openchirp/device/pi-42/"
            interval = "1h45m"

            [sources]
            network = true
            disk_path = "/data"
            plugins = ["raspberrypi"]
            plugin_paths = "/opt/ups.sh;;/opt/fan.sh"
            "#,
        );
        assert_eq!(config.interval().unwrap(), Duration::from_secs(6300));
        assert_eq!(config.telemetry_prefix(), "openchirp/device/pi-42");
        assert_eq!(
            config.sources.plugin_entries(),
            vec!["raspberrypi", "/opt/ups.sh", "/opt/fan.sh"]
        );
        assert_eq!(
            config.broker().unwrap(),
            BrokerAddress {
                host: "broker.example.com".into(),
                port: 8883,
                tls: true
            }
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = parse(r#"device_id = "from-file""#);
        let env: HashMap<&str, &str> = [
            ("DEVICE_ID", "from-env"),
            ("INTERVAL", "30s"),
            ("DISK_PATH", "/var"),
            ("PLUGIN_PATHS", "network"),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.device_id, "from-env");
        assert_eq!(config.interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.sources.disk_path, "/var");
        assert_eq!(config.sources.plugin_entries(), vec!["network"]);
        assert_eq!(config.device_token, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let config = parse("device_id = \"\"");
        assert!(matches!(config.validate(), Err(ConfigError::MissingDeviceId)));

        let config = parse("device_id = \"a\"\ninterval = \"0s\"");
        assert!(matches!(config.validate(), Err(ConfigError::Interval(_))));

        let config = parse("device_id = \"a\"\nmqtt_server = \"http://broker:80\"");
        assert!(matches!(config.validate(), Err(ConfigError::Endpoint(_))));

        let config = parse("device_id = \"a\"\nmqtt_server = \"tcp://broker:notaport\"");
        assert!(matches!(config.broker(), Err(ConfigError::Endpoint(_))));
    }

    #[test]
    fn broker_without_scheme_is_plain_tcp() {
        let config = parse("device_id = \"a\"\nmqtt_server = \"10.0.0.5:1884\"");
        assert_eq!(
            config.broker().unwrap(),
            BrokerAddress {
                host: "10.0.0.5".into(),
                port: 1884,
                tls: false
            }
        );
    }

    #[test]
    fn ipv6_brokers_drop_the_brackets() {
        let config = parse("device_id = \"a\"\nmqtt_server = \"tcp://[::1]:1884\"");
        assert_eq!(
            config.broker().unwrap(),
            BrokerAddress {
                host: "::1".into(),
                port: 1884,
                tls: false
            }
        );

        let config = parse("device_id = \"a\"\nmqtt_server = \"tls://[fe80::1]\"");
        let broker = config.broker().unwrap();
        assert_eq!(broker.host, "fe80::1");
        assert_eq!(broker.port, 8883);

        for bad in ["tcp://::1:1883", "tcp://[::1", "tcp://[::1]1883", "tcp://[]:1883"] {
            let config = parse(&format!("device_id = \"a\"\nmqtt_server = \"{bad}\""));
            assert!(
                matches!(config.broker(), Err(ConfigError::Endpoint(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "device_id = \"pi\"\ninterval = \"15s\"\n").unwrap();

        let config = AgentConfig::load(&path.to_string_lossy()).unwrap();
        assert_eq!(config.device_id, "pi");
        assert_eq!(config.interval().unwrap(), Duration::from_secs(15));

        assert!(AgentConfig::load("/no/such/agent.toml").is_err());
    }
}
