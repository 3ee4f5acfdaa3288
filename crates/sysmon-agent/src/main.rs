use anyhow::Result;
use sysmon_agent::config::AgentConfig;
use sysmon_agent::mqtt::{MqttPublisher, MqttSettings};
use sysmon_agent::orchestrator::{self, Orchestrator};
use sysmon_agent::{build_registry, signal};
use sysmon_common::duration::format_duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sysmon_agent=info".parse()?)
                .add_directive("sysmon_collector=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let mut config = AgentConfig::load(&config_path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    let interval = config.interval()?;

    tracing::info!(
        device_id = %config.device_id,
        interval = %format_duration(interval),
        "sysmon-agent starting"
    );

    let registry = build_registry(&config.sources);
    let (handle, inbox) = orchestrator::channel();

    let settings = MqttSettings::from_config(&config)?;
    let publisher = MqttPublisher::connect(settings, handle.clone()).await?;
    tracing::info!("Started device");

    let signals = signal::spawn_signal_watcher(handle.clone());
    let result = Orchestrator::new(interval, registry, publisher, inbox)?.run().await;

    signals.abort();
    result
}
