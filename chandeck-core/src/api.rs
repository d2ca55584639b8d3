//! Backend contract for the channel control plane.
//!
//! A `ControlPlane` is bound to one server address and knows how to fetch the
//! three directory resources, per-channel telemetry, and how to send start/stop
//! commands. The HTTP implementation lives in the CLI crate; `FakeControlPlane`
//! implements it in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{
    ChannelConfig, ChannelName, InputKind, InputStats, OutputStatSample, ProcessInfo,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} returned HTTP {status}{}", message_suffix(.message))]
    Status {
        url: String,
        status: u16,
        message: Option<String>,
    },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {}", m))
        .unwrap_or_default()
}

// --- Wire shapes -----------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ChannelDirectoryBody {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RunningEntry {
    #[serde(default)]
    pub running: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RunningListBody {
    #[serde(default)]
    pub channels: BTreeMap<ChannelName, RunningEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ProcessEntry {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub running: Option<bool>,
}

impl From<&ProcessEntry> for ProcessInfo {
    fn from(p: &ProcessEntry) -> Self {
        ProcessInfo {
            pid: p.pid,
            cpu_usage: p.cpu_usage,
            uptime_seconds: p.uptime.filter(|u| *u >= 0.0).map(|u| u as u64),
            running: p.running,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelProcesses {
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessEntry>,
}

impl ChannelProcesses {
    pub fn input(&self) -> Option<&ProcessEntry> {
        self.processes.get("input")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProcessStatusBody {
    #[serde(default)]
    pub channels: BTreeMap<ChannelName, ChannelProcesses>,
}

/// One element of a `/stats/live/...` series.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TelemetryPoint {
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub stats: Map<String, Value>,
}

/// Latest primary-input sample out of a series; the last element wins.
pub fn latest_input_stats(series: &[TelemetryPoint], kind: InputKind) -> Option<InputStats> {
    let last = series.last()?;
    Some(InputStats {
        bitrate_mbps: last.stats.get(kind.bitrate_field()).and_then(Value::as_f64),
        timestamp: last.timestamp,
    })
}

/// Latest output sample. Points without a timestamp cannot be aged and are
/// treated as missing.
pub fn latest_output_sample(series: &[TelemetryPoint], index: usize) -> Option<OutputStatSample> {
    let last = series.last()?;
    let timestamp = last.timestamp?;
    Some(OutputStatSample {
        output_index: index,
        bitrate_mbps: last
            .stats
            .get("bitrate_mbps")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        timestamp_seconds: timestamp,
    })
}

// --- Commands --------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelAction {
    Start,
    Stop,
}

impl ChannelAction {
    pub fn from_should_start(should_start: bool) -> Self {
        if should_start {
            ChannelAction::Start
        } else {
            ChannelAction::Stop
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ChannelAction::Start => "start",
            ChannelAction::Stop => "stop",
        }
    }
}

impl fmt::Display for ChannelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelCommand {
    pub channel: ChannelName,
    pub action: ChannelAction,
    pub source_index: u32,
}

impl ChannelCommand {
    pub fn new(channel: impl Into<String>, action: ChannelAction) -> Self {
        Self {
            channel: channel.into(),
            action,
            source_index: 0,
        }
    }

    /// JSON body for `POST /start` and `POST /stop`.
    pub fn body(&self) -> Value {
        serde_json::json!({
            "channel": self.channel,
            "source_index": self.source_index,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CommandAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Some("success".into()),
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some("error".into()),
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

// --- Traits ----------------------------------------------------------------

/// A control plane bound to one server.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Human-readable name of this backend
    fn name(&self) -> &'static str;

    /// Configuration directory. The only mandatory resource.
    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, ApiError>;

    async fn running_list(&self) -> Result<BTreeMap<ChannelName, RunningEntry>, ApiError>;

    async fn process_status(&self) -> Result<BTreeMap<ChannelName, ChannelProcesses>, ApiError>;

    /// Latest primary-input telemetry, `Ok(None)` when the series is empty.
    async fn input_stats(
        &self,
        channel: &str,
        kind: InputKind,
    ) -> Result<Option<InputStats>, ApiError>;

    async fn output_stats(
        &self,
        channel: &str,
        output_index: usize,
    ) -> Result<Option<OutputStatSample>, ApiError>;

    async fn send_command(&self, command: &ChannelCommand) -> Result<CommandAck, ApiError>;
}

/// Placeholder until a usable server is bound. Every request fails.
#[derive(Clone, Debug)]
pub struct Disconnected {
    reason: String,
}

impl Disconnected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, ApiError> {
        Err(ApiError::Transport {
            url: String::new(),
            message: self.reason.clone(),
        })
    }
}

#[async_trait]
impl ControlPlane for Disconnected {
    fn name(&self) -> &'static str {
        "disconnected"
    }

    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, ApiError> {
        self.fail()
    }

    async fn running_list(&self) -> Result<BTreeMap<ChannelName, RunningEntry>, ApiError> {
        self.fail()
    }

    async fn process_status(&self) -> Result<BTreeMap<ChannelName, ChannelProcesses>, ApiError> {
        self.fail()
    }

    async fn input_stats(&self, _: &str, _: InputKind) -> Result<Option<InputStats>, ApiError> {
        self.fail()
    }

    async fn output_stats(&self, _: &str, _: usize) -> Result<Option<OutputStatSample>, ApiError> {
        self.fail()
    }

    async fn send_command(&self, _: &ChannelCommand) -> Result<CommandAck, ApiError> {
        self.fail()
    }
}

/// Binds a `ControlPlane` to a server address.
pub trait BackendFactory: Send + Sync {
    fn connect(&self, server: &str) -> Arc<dyn ControlPlane>;
}
