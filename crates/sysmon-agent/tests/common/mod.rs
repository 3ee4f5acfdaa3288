#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysmon_agent::orchestrator::{ControlEvent, ReporterHandle};
use sysmon_agent::publisher::Publisher;
use sysmon_collector::MetricSource;
use sysmon_common::types::Fields;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub at: Duration,
    pub field: String,
    pub value: String,
}

#[derive(Default)]
struct Recorded {
    messages: Vec<Published>,
    closed: bool,
}

/// Publisher that records every message with its time relative to creation.
#[derive(Clone)]
pub struct RecordingPublisher {
    start: Instant,
    fail_on: Option<String>,
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            fail_on: None,
            recorded: Arc::default(),
        }
    }

    /// Rejects every publish of `field`.
    pub fn failing_on(field: &str) -> Self {
        Self {
            fail_on: Some(field.to_string()),
            ..Self::new()
        }
    }

    pub fn messages(&self) -> Vec<Published> {
        self.recorded.lock().unwrap().messages.clone()
    }

    pub fn values_of(&self, field: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.field == field)
            .map(|m| m.value)
            .collect()
    }

    /// Whole seconds since creation at which `field` was published.
    pub fn seconds_of(&self, field: &str) -> Vec<u64> {
        self.messages()
            .into_iter()
            .filter(|m| m.field == field)
            .map(|m| m.at.as_secs())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.recorded.lock().unwrap().closed
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, field: &str, value: &str) -> Result<()> {
        if self.fail_on.as_deref() == Some(field) {
            return Err(anyhow!("broker rejected {field}"));
        }
        let at = Instant::now().duration_since(self.start);
        self.recorded.lock().unwrap().messages.push(Published {
            at,
            field: field.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.recorded.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Emits `<name>` with a sample counter, starting at 1.
pub struct CountingSource {
    name: String,
    samples: Arc<AtomicU64>,
}

impl CountingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            samples: Arc::default(),
        }
    }

    pub fn boxed(name: &str) -> Box<dyn MetricSource> {
        Box::new(Self::new(name))
    }
}

impl MetricSource for CountingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&mut self) -> Result<Fields> {
        let n = self.samples.fetch_add(1, Ordering::SeqCst) + 1;
        let mut fields = Fields::new();
        fields.insert(self.name.clone(), n.into());
        Ok(fields)
    }
}

/// Emits fixed values.
pub struct FixedSource {
    name: String,
    fields: Fields,
}

impl FixedSource {
    pub fn boxed(name: &str, values: &[(&str, &str)]) -> Box<dyn MetricSource> {
        Box::new(Self {
            name: name.to_string(),
            fields: values
                .iter()
                .map(|(k, v)| (k.to_string(), (*v).into()))
                .collect(),
        })
    }
}

impl MetricSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&mut self) -> Result<Fields> {
        Ok(self.fields.clone())
    }
}

/// Always fails with `message`.
pub struct FailingSource {
    name: String,
    message: String,
}

impl FailingSource {
    pub fn boxed(name: &str, message: &str) -> Box<dyn MetricSource> {
        Box::new(Self {
            name: name.to_string(),
            message: message.to_string(),
        })
    }
}

impl MetricSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&mut self) -> Result<Fields> {
        Err(anyhow!("{}", self.message))
    }
}

/// Requests shutdown from inside its first sample, i.e. mid-cycle.
pub struct ShutdownDuringSample {
    handle: ReporterHandle,
    fired: AtomicBool,
}

impl ShutdownDuringSample {
    pub fn boxed(handle: ReporterHandle) -> Box<dyn MetricSource> {
        Box::new(Self {
            handle,
            fired: AtomicBool::new(false),
        })
    }
}

impl MetricSource for ShutdownDuringSample {
    fn name(&self) -> &str {
        "stopper"
    }

    fn sample(&mut self) -> Result<Fields> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            assert!(self.handle.try_send(ControlEvent::Shutdown));
        }
        let mut fields = Fields::new();
        fields.insert("stopper".to_string(), "sampled".into());
        Ok(fields)
    }
}
