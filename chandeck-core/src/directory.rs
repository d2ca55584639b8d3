//! Channel directory: fetches and correlates the three authoritative
//! resources into per-channel runtime records.

use std::collections::BTreeMap;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::api::{ApiError, ChannelProcesses, ControlPlane, RunningEntry};
use crate::model::{ChannelConfig, ProcessInfo, RuntimeIndex, RuntimeInfo, StatsIndex};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    /// The configuration list could not be fetched; nothing can be rendered.
    #[error("channel configuration unavailable: {0}")]
    ConfigFetch(#[source] ApiError),
}

/// Result of one directory refresh.
#[derive(Clone, Debug, Default)]
pub struct DirectorySnapshot {
    /// Configuration entries in server-reported order.
    pub configs: Vec<ChannelConfig>,
    pub runtime_index: RuntimeIndex,
    /// Primary-input telemetry for running channels.
    pub stats: StatsIndex,
}

impl DirectorySnapshot {
    pub fn running_count(&self) -> usize {
        self.runtime_index.values().filter(|r| r.is_running).count()
    }
}

pub struct ChannelDirectory;

impl ChannelDirectory {
    /// Fetch configs (mandatory), running list and process status
    /// (best-effort), then input telemetry for each running channel.
    pub async fn refresh(backend: &dyn ControlPlane) -> Result<DirectorySnapshot, DirectoryError> {
        let (configs, running, status) = tokio::join!(
            backend.channel_configs(),
            backend.running_list(),
            backend.process_status(),
        );

        let configs = configs.map_err(DirectoryError::ConfigFetch)?;

        let running = running.unwrap_or_else(|e| {
            warn!("running list unavailable, treating channels as stopped: {}", e);
            BTreeMap::new()
        });
        let status = status
            .inspect_err(|e| {
                warn!("process status unavailable, treating channels as stopped: {}", e)
            })
            .ok();

        let runtime_index = correlate(&configs, &running, status.as_ref());

        let fetches = configs
            .iter()
            .filter(|c| runtime_index.get(&c.name).is_some_and(|r| r.is_running))
            .filter_map(|c| Some((c.name.as_str(), c.input_kind()?)))
            .map(|(name, kind)| async move { (name, backend.input_stats(name, kind).await) });

        let mut stats = StatsIndex::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(Some(sample)) => {
                    stats.insert(name.to_string(), sample);
                }
                Ok(None) => {}
                Err(e) => debug!("input stats for {} unavailable: {}", name, e),
            }
        }

        debug!(
            "directory: {} channels, {} running, {} with input stats",
            configs.len(),
            runtime_index.values().filter(|r| r.is_running).count(),
            stats.len()
        );

        Ok(DirectorySnapshot {
            configs,
            runtime_index,
            stats,
        })
    }
}

/// Join the running list and status map by channel name. A channel listed as
/// running but absent from a fetched status map still counts as running, with
/// no process details. Without a status map (`None`, the fetch failed) every
/// channel is stopped.
pub fn correlate(
    configs: &[ChannelConfig],
    running: &BTreeMap<String, RunningEntry>,
    status: Option<&BTreeMap<String, ChannelProcesses>>,
) -> RuntimeIndex {
    configs
        .iter()
        .map(|cfg| {
            let is_running =
                status.is_some() && running.get(&cfg.name).is_some_and(|r| r.running);
            let process = if is_running {
                status
                    .and_then(|s| s.get(&cfg.name))
                    .and_then(ChannelProcesses::input)
                    .map(ProcessInfo::from)
            } else {
                None
            };
            (
                cfg.name.clone(),
                RuntimeInfo {
                    is_running,
                    process,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProcessEntry;
    use crate::fake::FakeControlPlane;
    use crate::model::{InputConfig, InputStats};

    fn udp_channel(name: &str) -> ChannelConfig {
        let mut cfg = ChannelConfig::new(name);
        cfg.inputs.push(InputConfig {
            uri: Some("udp://239.0.0.1:5000".into()),
            kind: Some("udpsrc".into()),
            ..Default::default()
        });
        cfg
    }

    #[tokio::test]
    async fn test_refresh_correlates_by_name() {
        let fake = FakeControlPlane::new();
        fake.add_channel(udp_channel("a"), true);
        fake.add_channel(udp_channel("b"), false);
        fake.set_input_stats(
            "a",
            InputStats {
                bitrate_mbps: Some(6.0),
                timestamp: Some(1.0),
            },
        );
        fake.set_input_stats(
            "b",
            InputStats {
                bitrate_mbps: Some(1.0),
                timestamp: Some(1.0),
            },
        );

        let snap = ChannelDirectory::refresh(&fake).await.unwrap();
        let names: Vec<_> = snap.configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(snap.runtime_index["a"].is_running);
        assert!(snap.runtime_index["a"].process.as_ref().unwrap().pid.is_some());
        assert!(!snap.runtime_index["b"].is_running);
        // stats only for running channels
        assert!(snap.stats.contains_key("a"));
        assert!(!snap.stats.contains_key("b"));
    }

    #[tokio::test]
    async fn test_running_without_status_entry_is_still_running() {
        let fake = FakeControlPlane::new();
        fake.add_channel(udp_channel("a"), true);
        fake.set_process("a", None);

        let snap = ChannelDirectory::refresh(&fake).await.unwrap();
        assert!(snap.runtime_index["a"].is_running);
        assert!(snap.runtime_index["a"].process.is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_degrades_to_not_running() {
        let fake = FakeControlPlane::new();
        fake.add_channel(udp_channel("a"), true);
        fake.fail_running_list(Some("connection refused"));

        let snap = ChannelDirectory::refresh(&fake).await.unwrap();
        assert_eq!(snap.configs.len(), 1);
        assert!(!snap.runtime_index["a"].is_running);

        fake.fail_running_list(None);
        fake.fail_process_status(Some("timeout"));
        let snap = ChannelDirectory::refresh(&fake).await.unwrap();
        assert!(!snap.runtime_index["a"].is_running);
        assert!(snap.runtime_index["a"].process.is_none());
        assert!(snap.stats.is_empty());
    }

    #[tokio::test]
    async fn test_input_stats_fetched_for_every_running_channel() {
        let fake = FakeControlPlane::new();
        for name in ["a", "b", "c"] {
            fake.add_channel(udp_channel(name), name != "b");
            fake.set_input_stats(
                name,
                InputStats {
                    bitrate_mbps: Some(2.0),
                    timestamp: Some(1.0),
                },
            );
        }

        let snap = ChannelDirectory::refresh(&fake).await.unwrap();
        let with_stats: Vec<_> = snap.stats.keys().map(String::as_str).collect();
        assert_eq!(with_stats, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_config_failure_is_surfaced() {
        let fake = FakeControlPlane::new();
        fake.add_channel(udp_channel("a"), true);
        fake.fail_configs(Some("HTTP 500"));

        let err = ChannelDirectory::refresh(&fake).await.unwrap_err();
        assert!(matches!(err, DirectoryError::ConfigFetch(_)));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_correlate_ignores_stopped_process_details() {
        let configs = vec![ChannelConfig::new("a")];
        let mut running = BTreeMap::new();
        running.insert("a".to_string(), RunningEntry { running: false });
        let mut status = BTreeMap::new();
        let mut processes = BTreeMap::new();
        processes.insert(
            "input".to_string(),
            ProcessEntry {
                pid: Some(1),
                ..Default::default()
            },
        );
        status.insert("a".to_string(), ChannelProcesses { processes });

        let index = correlate(&configs, &running, Some(&status));
        assert_eq!(index["a"], RuntimeInfo::default());
    }

    #[test]
    fn test_correlate_without_status_map_stops_everything() {
        let configs = vec![ChannelConfig::new("a"), ChannelConfig::new("b")];
        let mut running = BTreeMap::new();
        running.insert("a".to_string(), RunningEntry { running: true });

        let fetched = correlate(&configs, &running, Some(&BTreeMap::new()));
        assert!(fetched["a"].is_running);
        assert!(fetched["a"].process.is_none());

        let failed = correlate(&configs, &running, None);
        assert!(!failed["a"].is_running);
        assert!(!failed["b"].is_running);
    }
}
