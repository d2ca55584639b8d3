//! HTTP control plane.
//!
//! Three services sit behind one server address: the configuration API,
//! the process controller and the telemetry store. Ports are configurable;
//! stock servers run config and telemetry on 5000 and control on 8001.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use chandeck_core::api::{
    ApiError, BackendFactory, ChannelCommand, ChannelDirectoryBody, ChannelProcesses, CommandAck,
    ControlPlane, Disconnected, ProcessStatusBody, RunningEntry, RunningListBody, TelemetryPoint,
    latest_input_stats, latest_output_sample,
};
use chandeck_core::config::Ports;
use chandeck_core::model::{ChannelConfig, ChannelName, InputKind, InputStats, OutputStatSample};

pub struct HttpControlPlane {
    client: Client,
    config_base: Url,
    control_base: Url,
    stats_base: Url,
}

/// `host` or `scheme://host`, plus a port.
fn base_url(server: &str, port: u16) -> Result<Url, ApiError> {
    let (scheme, host) = match server.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("http", server),
    };
    let host = host.trim_end_matches('/');
    let raw = format!("{}://{}:{}/", scheme, host, port);
    Url::parse(&raw).map_err(|e| ApiError::Transport {
        url: raw.clone(),
        message: e.to_string(),
    })
}

fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return Some(text.to_string());
            }
        }
    }
    Some(body.chars().take(200).collect())
}

impl HttpControlPlane {
    pub fn new(server: &str, ports: Ports, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self::with_bases(
            base_url(server, ports.config)?,
            base_url(server, ports.control)?,
            base_url(server, ports.stats)?,
            timeout,
        ))
    }

    pub fn with_bases(config: Url, control: Url, stats: Url, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("http client with timeout unavailable ({}), using defaults", e);
                Client::new()
            });
        Self {
            client,
            config_base: config,
            control_base: control,
            stats_base: stats,
        }
    }

    async fn read_body(url: &Url, resp: reqwest::Response) -> Result<String, ApiError> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let body = Self::read_body(&url, resp).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// A series that does not exist yet is the same as an empty one.
    async fn telemetry(&self, channel: &str, resource: &str) -> Result<Vec<TelemetryPoint>, ApiError> {
        let url = join(&self.stats_base, &["stats", "live", channel, resource]);
        match self.get_json(url).await {
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(Vec::new())
            }
            other => other,
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn channel_configs(&self) -> Result<Vec<ChannelConfig>, ApiError> {
        let body: ChannelDirectoryBody = self
            .get_json(join(&self.config_base, &["api", "channels"]))
            .await?;
        Ok(body.channels)
    }

    async fn running_list(&self) -> Result<BTreeMap<ChannelName, RunningEntry>, ApiError> {
        let body: RunningListBody = self.get_json(join(&self.control_base, &["list"])).await?;
        Ok(body.channels)
    }

    async fn process_status(&self) -> Result<BTreeMap<ChannelName, ChannelProcesses>, ApiError> {
        let body: ProcessStatusBody = self
            .get_json(join(&self.control_base, &["status"]))
            .await?;
        Ok(body.channels)
    }

    async fn input_stats(
        &self,
        channel: &str,
        kind: InputKind,
    ) -> Result<Option<InputStats>, ApiError> {
        let series = self.telemetry(channel, kind.resource()).await?;
        Ok(latest_input_stats(&series, kind))
    }

    async fn output_stats(
        &self,
        channel: &str,
        output_index: usize,
    ) -> Result<Option<OutputStatSample>, ApiError> {
        let resource = format!("udp_output_{}", output_index);
        let series = self.telemetry(channel, &resource).await?;
        Ok(latest_output_sample(&series, output_index))
    }

    async fn send_command(&self, command: &ChannelCommand) -> Result<CommandAck, ApiError> {
        let url = join(&self.control_base, &[command.action.path()]);
        debug!("POST {} {}", url, command.channel);
        let resp = self
            .client
            .post(url.clone())
            .json(&command.body())
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let body = Self::read_body(&url, resp).await?;
        if body.trim().is_empty() {
            return Ok(CommandAck::default());
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Connects to servers using the configured ports.
pub struct HttpFactory {
    pub ports: Ports,
    pub timeout: Duration,
}

impl BackendFactory for HttpFactory {
    fn connect(&self, server: &str) -> Arc<dyn ControlPlane> {
        match HttpControlPlane::new(server, self.ports, self.timeout) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                warn!("invalid server address {:?}: {}", server, e);
                Arc::new(Disconnected::new(format!("invalid server address {:?}", server)))
            }
        }
    }
}
