//! The reporting control loop.
//!
//! One task owns the report interval, the periodic deadline, the source
//! registry and the publisher. Everything else (the MQTT listener, the
//! signal watcher) talks to it only by sending a [`ControlEvent`] through a
//! [`ReporterHandle`]. Events and timer expiries are serviced one at a time,
//! so at most one aggregation cycle is ever in flight.

use crate::publisher::Publisher;
use anyhow::{ensure, Context, Result};
use std::time::Duration;
use sysmon_collector::registry::SourceRegistry;
use sysmon_common::duration::{format_duration, parse_interval};
use sysmon_common::topics;
use sysmon_common::types::Report;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

const INBOX_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Run one report now without moving the periodic deadline.
    Trigger,
    /// Proposed new interval, as received on the `interval` topic.
    SetInterval(String),
    /// Stop after the current cycle.
    Shutdown,
}

/// Cloneable sender side of the reporter's inbox.
#[derive(Debug, Clone)]
pub struct ReporterHandle {
    tx: mpsc::Sender<ControlEvent>,
}

impl ReporterHandle {
    /// Queues an event, waiting for inbox capacity. Returns `false` once the
    /// reporter has stopped.
    pub async fn send(&self, event: ControlEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Queues an event without waiting. Returns `false` if the inbox is full
    /// or the reporter has stopped.
    pub fn try_send(&self, event: ControlEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(?event, "Reporter inbox full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn trigger(&self) -> bool {
        self.send(ControlEvent::Trigger).await
    }

    pub async fn set_interval(&self, payload: impl Into<String>) -> bool {
        self.send(ControlEvent::SetInterval(payload.into())).await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(ControlEvent::Shutdown).await
    }
}

/// Receiving side of the reporter's inbox, consumed by [`Orchestrator::new`].
#[derive(Debug)]
pub struct Inbox(mpsc::Receiver<ControlEvent>);

/// Creates the reporter's event channel.
pub fn channel() -> (ReporterHandle, Inbox) {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    (ReporterHandle { tx }, Inbox(rx))
}

#[derive(Debug, Clone, Copy)]
enum CycleReason {
    Startup,
    Timer,
    Trigger,
    Reconfigured,
}

impl CycleReason {
    fn as_str(self) -> &'static str {
        match self {
            CycleReason::Startup => "startup",
            CycleReason::Timer => "timer",
            CycleReason::Trigger => "trigger",
            CycleReason::Reconfigured => "interval_change",
        }
    }
}

enum Wake {
    Timer,
    Event(Option<ControlEvent>),
}

/// State owned by the control loop.
struct LoopState {
    interval: Duration,
    deadline: Instant,
    cycles: u64,
}

impl LoopState {
    fn rearm(&mut self) {
        self.deadline = Instant::now() + self.interval;
    }
}

pub struct Orchestrator<P> {
    state: LoopState,
    registry: SourceRegistry,
    publisher: P,
    inbox: mpsc::Receiver<ControlEvent>,
}

impl<P: Publisher> Orchestrator<P> {
    pub fn new(interval: Duration, registry: SourceRegistry, publisher: P, inbox: Inbox) -> Result<Self> {
        ensure!(!interval.is_zero(), "report interval must be positive");
        Ok(Self {
            state: LoopState {
                interval,
                deadline: Instant::now() + interval,
                cycles: 0,
            },
            registry,
            publisher,
            inbox: inbox.0,
        })
    }

    /// Runs until a shutdown event arrives or every [`ReporterHandle`] is
    /// dropped. The publisher is closed on every exit path.
    ///
    /// # Errors
    ///
    /// Fails only if the initial interval announcement cannot be published.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;

        if let Err(e) = self.publisher.close().await {
            tracing::warn!(error = %e, "Failed to close publisher");
        }
        tracing::warn!(cycles = self.state.cycles, "Reporter shut down");
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.announce_interval()
            .await
            .context("Error publishing to interval topic")?;

        tracing::info!(
            interval = %format_duration(self.state.interval),
            sources = ?self.registry.source_names(),
            "Reporter running"
        );

        self.run_cycle(CycleReason::Startup).await;
        self.state.rearm();

        loop {
            let wake = tokio::select! {
                biased;
                event = self.inbox.recv() => Wake::Event(event),
                () = sleep_until(self.state.deadline) => Wake::Timer,
            };

            match wake {
                Wake::Timer => {
                    self.run_cycle(CycleReason::Timer).await;
                    self.state.rearm();
                }
                Wake::Event(Some(ControlEvent::Trigger)) => {
                    tracing::info!("Received trigger to push report");
                    self.run_cycle(CycleReason::Trigger).await;
                }
                Wake::Event(Some(ControlEvent::SetInterval(payload))) => {
                    self.reconfigure(&payload).await;
                }
                Wake::Event(Some(ControlEvent::Shutdown)) => {
                    tracing::info!("Received shutdown request");
                    break;
                }
                Wake::Event(None) => {
                    tracing::info!("All reporter handles dropped");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn reconfigure(&mut self, payload: &str) {
        tracing::debug!(payload, "Received interval change");

        match parse_interval(payload) {
            Ok(interval) => {
                self.state.interval = interval;
                tracing::info!(interval = %format_duration(interval), "Changing interval");
                if let Err(e) = self.announce_interval().await {
                    tracing::error!(error = %e, "Error publishing interval");
                }
                self.run_cycle(CycleReason::Reconfigured).await;
                self.state.rearm();
            }
            Err(e) => {
                let message = format!("Failed to parse interval \"{}\": {e}", payload.trim());
                self.report_error(&message).await;
            }
        }
    }

    async fn announce_interval(&self) -> Result<()> {
        let interval = format_duration(self.state.interval);
        self.publisher.publish(topics::INTERVAL, &interval).await
    }

    async fn run_cycle(&mut self, reason: CycleReason) {
        self.state.cycles += 1;
        tracing::info!(cycle = self.state.cycles, reason = reason.as_str(), "Doing report");

        let report = self.registry.produce_report();
        self.publish_report(&report).await;
    }

    async fn publish_report(&self, report: &Report) {
        for failure in &report.failures {
            self.report_error(&failure.payload()).await;
        }
        for (field, value) in &report.fields {
            self.publish(field, &value.to_string()).await;
        }

        tracing::debug!(
            fields = report.fields.len(),
            failures = report.failures.len(),
            collected_at = %report.collected_at,
            "Report published"
        );
    }

    async fn report_error(&self, message: &str) {
        tracing::error!("{message}");
        self.publish(topics::ERROR, message).await;
    }

    async fn publish(&self, field: &str, value: &str) {
        tracing::debug!(field, value, "Publishing");
        if let Err(e) = self.publisher.publish(field, value).await {
            tracing::error!(field, error = %e, "Error publishing");
        }
    }
}
