use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single measurement value. Always rendered as text when published.
///
/// # Examples
///
/// ```
/// use sysmon_common::types::MetricValue;
///
/// assert_eq!(MetricValue::from(15.5).to_string(), "15.5");
/// assert_eq!(MetricValue::from(42u64).to_string(), "42");
/// assert_eq!(MetricValue::from("eth0").to_string(), "eth0");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Int(u64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Bool(v) => write!(f, "{v}"),
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

/// Named values produced by one source in one sample.
pub type Fields = BTreeMap<String, MetricValue>;

/// One source that could not produce values during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

impl SourceFailure {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Text published on the `error` topic for this failure.
    pub fn payload(&self) -> String {
        format!("{}: {}", self.source, self.message)
    }
}

/// The merged result of one aggregation cycle.
///
/// Built fresh every cycle and never compared with a previous one. Fields
/// from different sources share one namespace: merging a field name that is
/// already present replaces the earlier value.
///
/// # Examples
///
/// ```
/// use sysmon_common::types::{Fields, Report};
///
/// let mut report = Report::new();
/// let mut first = Fields::new();
/// first.insert("x".to_string(), 1u64.into());
/// let mut second = Fields::new();
/// second.insert("x".to_string(), 2u64.into());
///
/// report.merge(first);
/// report.merge(second);
/// assert_eq!(report.get("x").map(ToString::to_string).as_deref(), Some("2"));
/// ```
#[derive(Debug, Clone)]
pub struct Report {
    pub collected_at: DateTime<Utc>,
    pub fields: Fields,
    pub failures: Vec<SourceFailure>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            collected_at: Utc::now(),
            fields: Fields::new(),
            failures: Vec::new(),
        }
    }

    /// Merges one source's fields, returning the names that replaced a value
    /// contributed by an earlier source.
    pub fn merge(&mut self, fields: Fields) -> Vec<String> {
        let mut overwritten = Vec::new();
        for (name, value) in fields {
            if self.fields.insert(name.clone(), value).is_some() {
                overwritten.push(name);
            }
        }
        overwritten
    }

    pub fn record_failure(&mut self, failure: SourceFailure) {
        self.failures.push(failure);
    }

    pub fn get(&self, field: &str) -> Option<&MetricValue> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.failures.is_empty()
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}
