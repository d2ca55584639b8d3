//! In-memory control plane.
//!
//! Backs `--demo` mode and the test suites. Every resource can be scripted
//! (including failures), and telemetry fetches are counted per channel so
//! tests can assert that evicted channels stop being polled.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    ApiError, BackendFactory, ChannelAction, ChannelCommand, ChannelProcesses, CommandAck,
    ControlPlane, ProcessEntry, RunningEntry,
};
use crate::clock::{Clock, SystemClock};
use crate::model::{
    ChannelConfig, ChannelName, InputConfig, InputKind, InputStats, OutputConfig,
    OutputStatSample, PortValue,
};

#[derive(Debug, Default)]
struct FakeState {
    configs: Vec<ChannelConfig>,
    configs_error: Option<String>,
    running: BTreeMap<ChannelName, RunningEntry>,
    running_error: Option<String>,
    status: BTreeMap<ChannelName, ChannelProcesses>,
    status_error: Option<String>,
    input_stats: BTreeMap<ChannelName, InputStats>,
    output_samples: BTreeMap<(ChannelName, usize), OutputStatSample>,
    /// Scripted replies, consumed front to back before the default behavior.
    command_replies: Vec<Result<CommandAck, ApiError>>,
    commands: Vec<ChannelCommand>,
    /// Applied to every command before it is answered.
    command_latency: Option<Duration>,
    telemetry_fetches: BTreeMap<ChannelName, u64>,
    directory_fetches: u64,
    next_pid: u32,
    /// Synthesize fresh output samples for running channels.
    live_outputs: bool,
}

#[derive(Clone)]
pub struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
    clock: Arc<dyn Clock>,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_pid: 4000,
                ..FakeState::default()
            })),
            clock,
        }
    }

    /// A small channel lineup with live-looking telemetry.
    pub fn demo() -> Self {
        let fake = Self::new();
        fake.add_channel(demo_channel("news-hd", "srtsrc", "srt://0.0.0.0:9000", 2), true);
        fake.add_channel(demo_channel("sports-1", "udpsrc", "udp://239.0.0.10:5000", 1), true);
        fake.add_channel(demo_channel("backup-feed", "hlssrc", "https://cdn.example/live.m3u8", 1), false);
        fake.add_channel(demo_channel("radio-simulcast", "udpsrc", "udp://239.0.0.20:5000", 0), false);
        fake.lock().live_outputs = true;
        fake
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_channel(&self, config: ChannelConfig, running: bool) {
        let name = config.name.clone();
        {
            let mut st = self.lock();
            st.configs.retain(|c| c.name != name);
            st.configs.push(config);
        }
        self.set_running(&name, running);
    }

    pub fn remove_channel(&self, name: &str) {
        let mut st = self.lock();
        st.configs.retain(|c| c.name != name);
        st.running.remove(name);
        st.status.remove(name);
    }

    pub fn replace_config(&self, config: ChannelConfig) {
        let mut st = self.lock();
        if let Some(slot) = st.configs.iter_mut().find(|c| c.name == config.name) {
            *slot = config;
        }
    }

    /// Mark a channel running/stopped in both the running list and the status map.
    pub fn set_running(&self, name: &str, running: bool) {
        let mut st = self.lock();
        st.running
            .insert(name.to_string(), RunningEntry { running });
        if running {
            st.next_pid += 1;
            let pid = st.next_pid;
            let mut processes = BTreeMap::new();
            processes.insert(
                "input".to_string(),
                ProcessEntry {
                    pid: Some(pid),
                    cpu_usage: Some(2.5),
                    uptime: Some(1.0),
                    running: Some(true),
                },
            );
            st.status
                .insert(name.to_string(), ChannelProcesses { processes });
        } else {
            st.status.remove(name);
        }
    }

    pub fn set_process(&self, name: &str, entry: Option<ProcessEntry>) {
        let mut st = self.lock();
        match entry {
            Some(entry) => {
                let mut processes = BTreeMap::new();
                processes.insert("input".to_string(), entry);
                st.status
                    .insert(name.to_string(), ChannelProcesses { processes });
            }
            None => {
                st.status.remove(name);
            }
        }
    }

    pub fn set_input_stats(&self, name: &str, stats: InputStats) {
        self.lock().input_stats.insert(name.to_string(), stats);
    }

    pub fn set_output_sample(&self, name: &str, sample: Option<OutputStatSample>) {
        let mut st = self.lock();
        match sample {
            Some(sample) => {
                st.output_samples
                    .insert((name.to_string(), sample.output_index), sample);
            }
            None => {
                st.output_samples.retain(|(n, _), _| n != name);
            }
        }
    }

    pub fn fail_configs(&self, message: Option<&str>) {
        self.lock().configs_error = message.map(str::to_string);
    }

    pub fn fail_running_list(&self, message: Option<&str>) {
        self.lock().running_error = message.map(str::to_string);
    }

    pub fn fail_process_status(&self, message: Option<&str>) {
        self.lock().status_error = message.map(str::to_string);
    }

    pub fn push_command_reply(&self, reply: Result<CommandAck, ApiError>) {
        self.lock().command_replies.push(reply);
    }

    pub fn delay_commands(&self, latency: Option<Duration>) {
        self.lock().command_latency = latency;
    }

    pub fn commands(&self) -> Vec<ChannelCommand> {
        self.lock().commands.clone()
    }

    pub fn telemetry_fetches(&self, name: &str) -> u64 {
        self.lock().telemetry_fetches.get(name).copied().unwrap_or(0)
    }

    pub fn directory_fetches(&self) -> u64 {
        self.lock().directory_fetches
    }

    fn transport_error(resource: &str, message: &str) -> ApiError {
        ApiError::Transport {
            url: format!("fake://{}", resource),
            message: message.to_string(),
        }
    }
}

fn demo_channel(name: &str, input_type: &str, uri: &str, outputs: usize) -> ChannelConfig {
    let mut cfg = ChannelConfig::new(name);
    cfg.inputs.push(InputConfig {
        uri: Some(uri.to_string()),
        kind: Some(input_type.to_string()),
        ..Default::default()
    });
    cfg.outputs = (0..outputs)
        .map(|i| OutputConfig {
            kind: "udpsink".into(),
            host: Some(format!("239.1.0.{}", i + 1)),
            port: Some(PortValue::Number(6000 + i as u64)),
            ..Default::default()
        })
        .collect();
    cfg
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, ApiError> {
        let mut st = self.lock();
        st.directory_fetches += 1;
        if let Some(msg) = &st.configs_error {
            return Err(Self::transport_error("api/channels", msg));
        }
        Ok(st.configs.clone())
    }

    async fn running_list(&self) -> Result<BTreeMap<ChannelName, RunningEntry>, ApiError> {
        let st = self.lock();
        if let Some(msg) = &st.running_error {
            return Err(Self::transport_error("list", msg));
        }
        Ok(st.running.clone())
    }

    async fn process_status(&self) -> Result<BTreeMap<ChannelName, ChannelProcesses>, ApiError> {
        let st = self.lock();
        if let Some(msg) = &st.status_error {
            return Err(Self::transport_error("status", msg));
        }
        Ok(st.status.clone())
    }

    async fn input_stats(
        &self,
        channel: &str,
        _kind: InputKind,
    ) -> Result<Option<InputStats>, ApiError> {
        let st = self.lock();
        if st.live_outputs && st.running.get(channel).is_some_and(|r| r.running) {
            let now = self.clock.now_millis();
            return Ok(Some(InputStats {
                bitrate_mbps: Some(8.0 + (now / 1000 % 7) as f64 * 0.25),
                timestamp: Some(now as f64 / 1000.0),
            }));
        }
        Ok(st.input_stats.get(channel).cloned())
    }

    async fn output_stats(
        &self,
        channel: &str,
        output_index: usize,
    ) -> Result<Option<OutputStatSample>, ApiError> {
        let mut st = self.lock();
        *st.telemetry_fetches.entry(channel.to_string()).or_default() += 1;
        if st.live_outputs && st.running.get(channel).is_some_and(|r| r.running) {
            let now = self.clock.now_millis();
            return Ok(Some(OutputStatSample {
                output_index,
                bitrate_mbps: 4.0 + (now / 1000 % 5) as f64 * 0.1,
                timestamp_seconds: now as f64 / 1000.0,
            }));
        }
        Ok(st
            .output_samples
            .get(&(channel.to_string(), output_index))
            .cloned())
    }

    async fn send_command(&self, command: &ChannelCommand) -> Result<CommandAck, ApiError> {
        let latency = {
            let mut st = self.lock();
            st.commands.push(command.clone());
            st.command_latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let reply = {
            let mut st = self.lock();
            if st.command_replies.is_empty() {
                None
            } else {
                Some(st.command_replies.remove(0))
            }
        };
        if let Some(reply) = reply {
            return reply;
        }

        let known = self.lock().configs.iter().any(|c| c.name == command.channel);
        if !known {
            return Ok(CommandAck::error(format!(
                "channel {} not found",
                command.channel
            )));
        }
        let start = command.action == ChannelAction::Start;
        self.set_running(&command.channel, start);
        Ok(CommandAck::ok(format!(
            "channel {} {}",
            command.channel,
            if start { "started" } else { "stopped" }
        )))
    }
}

/// Hands out the same fake regardless of server address.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub backend: FakeControlPlane,
}

impl FakeFactory {
    pub fn new(backend: FakeControlPlane) -> Self {
        Self { backend }
    }
}

impl BackendFactory for FakeFactory {
    fn connect(&self, _server: &str) -> Arc<dyn ControlPlane> {
        Arc::new(self.backend.clone())
    }
}
