//! Shared data structures for pingwatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PING_STATE: &str = "ping_state";
pub const PING_TIME: &str = "ping_time";
pub const SERVICE_URL: &str = "serviceURL";

/// One configured target as read from the targets list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    pub id: String,
    pub address: String,
}

impl TargetConfig {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }

    /// A target whose id is its own address.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            address,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// A monitored endpoint and its latest observation.
///
/// `id` and `address` are fixed at construction. The remaining fields are
/// only meant to be changed by the state classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    id: String,
    address: String,
    pub state: ConnectionState,
    pub last_latency_ms: Option<f64>,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl Target {
    pub fn new(config: TargetConfig) -> Self {
        Self {
            id: config.id,
            address: config.address,
            state: ConnectionState::Unknown,
            last_latency_ms: None,
            last_observed_at: None,
            consecutive_failures: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Why a probe did not produce a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeFailure {
    Timeout,
    NoReply { status: Option<i32> },
    Transport(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => f.write_str("probe timed out"),
            ProbeFailure::NoReply { status: Some(code) } => {
                write!(f, "no reply (exit status {code})")
            }
            ProbeFailure::NoReply { status: None } => f.write_str("no reply"),
            ProbeFailure::Transport(message) => write!(f, "transport failure: {message}"),
        }
    }
}

/// Outcome of a single probe attempt. `latency_ms` is only ever set when
/// `succeeded` is true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub succeeded: bool,
    pub raw_output: Option<String>,
    pub latency_ms: Option<f64>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn replied(raw_output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            raw_output: Some(raw_output.into()),
            latency_ms: None,
            failure: None,
        }
    }

    pub fn measured(latency_ms: f64) -> Self {
        Self {
            succeeded: true,
            raw_output: None,
            latency_ms: Some(latency_ms),
            failure: None,
        }
    }

    pub fn failed(failure: ProbeFailure) -> Self {
        Self {
            succeeded: false,
            raw_output: None,
            latency_ms: None,
            failure: Some(failure),
        }
    }

    pub fn timed_out() -> Self {
        Self::failed(ProbeFailure::Timeout)
    }

    pub fn with_raw_output(mut self, raw_output: impl Into<String>) -> Self {
        self.raw_output = Some(raw_output.into());
        self
    }
}

/// Data-quality annotation carried by every published variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Uncertain,
    Bad,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable<T> {
    pub value: T,
    pub quality: Quality,
}

impl<T> Variable<T> {
    pub fn new(value: T, quality: Quality) -> Self {
        Self { value, quality }
    }
}

/// The field group published for one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetVariables {
    pub id: String,
    pub ping_state: Variable<bool>,
    pub ping_time: Variable<Option<f64>>,
    #[serde(rename = "serviceURL")]
    pub service_url: Variable<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    pub version: u64,
    pub updated_at_utc: String,
    pub targets: Vec<TargetVariables>,
}
