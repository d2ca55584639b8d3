use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ChannelName = String;

/// Primary input description. Only `uri` and `type` are interpreted.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct VideoStream {
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct VideoTranscoding {
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub streams: Vec<VideoStream>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct AudioTranscoding {
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Transcoding {
    #[serde(default)]
    pub video: Option<VideoTranscoding>,
    #[serde(default)]
    pub audio: Option<AudioTranscoding>,
}

/// Ports show up as numbers in most configs and as strings in hand-edited ones.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{}", n),
            PortValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<PortValue>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the configuration directory. Everything beyond the
/// comparison field set is carried along untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: ChannelName,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub transcoding: Transcoding,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn primary_input(&self) -> Option<&InputConfig> {
        self.inputs.first()
    }

    pub fn input_kind(&self) -> Option<InputKind> {
        self.primary_input()
            .and_then(|i| i.kind.as_deref())
            .and_then(InputKind::detect)
    }

    /// Video codec labels: per-stream codecs when streams exist, otherwise the
    /// single codec, defaulting to passthrough.
    pub fn video_codecs(&self) -> Vec<String> {
        let video = self.transcoding.video.as_ref();
        let streams = video.map(|v| v.streams.as_slice()).unwrap_or_default();
        if !streams.is_empty() {
            return streams.iter().filter_map(|s| s.codec.clone()).collect();
        }
        vec![
            video
                .and_then(|v| v.codec.clone())
                .unwrap_or_else(|| "Passthrough".to_string()),
        ]
    }

    pub fn audio_codec(&self) -> String {
        self.transcoding
            .audio
            .as_ref()
            .and_then(|a| a.codec.clone())
            .unwrap_or_else(|| "Passthrough".to_string())
    }

    /// The fixed field set used for structural diffing.
    pub fn shape(&self) -> ChannelShape {
        let input = self.primary_input();
        ChannelShape {
            name: self.name.clone(),
            input_uri: input.and_then(|i| i.uri.clone()),
            input_type: input.and_then(|i| i.kind.clone()),
            video_codecs: self.video_codecs(),
            audio_codec: self.audio_codec(),
            outputs: self.outputs.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelShape {
    pub name: ChannelName,
    pub input_uri: Option<String>,
    pub input_type: Option<String>,
    pub video_codecs: Vec<String>,
    pub audio_codec: String,
    pub outputs: Vec<OutputConfig>,
}

/// Which of the shape's fields differ between two configs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShapeDiff {
    pub input: bool,
    pub video: bool,
    pub audio: bool,
    pub outputs: bool,
}

impl ShapeDiff {
    pub fn between(old: &ChannelShape, new: &ChannelShape) -> Self {
        Self {
            input: old.input_uri != new.input_uri || old.input_type != new.input_type,
            video: old.video_codecs != new.video_codecs,
            audio: old.audio_codec != new.audio_codec,
            outputs: old.outputs != new.outputs,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.input || self.video || self.audio || self.outputs)
    }
}

/// Input family, selects which telemetry resource describes the primary input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputKind {
    Srt,
    Udp,
    Hls,
}

impl InputKind {
    pub fn detect(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        if lower.contains("srt") {
            Some(InputKind::Srt)
        } else if lower.contains("udp") {
            Some(InputKind::Udp)
        } else if lower.contains("hls") {
            Some(InputKind::Hls)
        } else {
            None
        }
    }

    pub fn resource(&self) -> &'static str {
        match self {
            InputKind::Srt => "srt_input",
            InputKind::Udp => "udp_input",
            InputKind::Hls => "hls_input",
        }
    }

    /// Field of the telemetry `stats` object carrying the input bitrate.
    pub fn bitrate_field(&self) -> &'static str {
        match self {
            InputKind::Srt => "receive-rate-mbps",
            InputKind::Udp | InputKind::Hls => "bitrate_mbps",
        }
    }
}

/// Input process details from the status map. `None` means unknown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessInfo {
    pub pid: Option<u32>,
    pub cpu_usage: Option<f64>,
    pub uptime_seconds: Option<u64>,
    pub running: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeInfo {
    pub is_running: bool,
    pub process: Option<ProcessInfo>,
}

pub type RuntimeIndex = BTreeMap<ChannelName, RuntimeInfo>;

/// Most recent primary-input telemetry sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputStats {
    pub bitrate_mbps: Option<f64>,
    pub timestamp: Option<f64>,
}

pub type StatsIndex = BTreeMap<ChannelName, InputStats>;

#[derive(Clone, Debug, PartialEq)]
pub struct OutputStatSample {
    pub output_index: usize,
    pub bitrate_mbps: f64,
    pub timestamp_seconds: f64,
}

/// Cached runtime mirror of one channel. Numeric fields are only populated
/// while running.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelStatus {
    pub is_running: bool,
    pub pid: Option<u32>,
    pub cpu_usage: Option<f64>,
    pub uptime_seconds: Option<u64>,
    pub bitrate_mbps: Option<f64>,
}

impl ChannelStatus {
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn derive(runtime: Option<&RuntimeInfo>, stats: Option<&InputStats>) -> Self {
        let Some(runtime) = runtime.filter(|r| r.is_running) else {
            return Self::stopped();
        };
        let process = runtime.process.as_ref();
        Self {
            is_running: true,
            pid: process.and_then(|p| p.pid),
            cpu_usage: process.and_then(|p| p.cpu_usage),
            uptime_seconds: process.and_then(|p| p.uptime_seconds),
            bitrate_mbps: stats.and_then(|s| s.bitrate_mbps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ChannelConfig {
        serde_json::from_value(serde_json::json!({
            "name": "news",
            "inputs": [{"type": "srtsrc", "uri": "srt://0.0.0.0:9000", "latency": 200}],
            "transcoding": {
                "video": {"streams": [{"codec": "x264enc"}, {"codec": "x265enc"}]},
                "audio": {"codec": "avenc_aac"}
            },
            "outputs": [{"type": "udpsink", "host": "239.0.0.1", "port": 5000}],
            "scheduler": {"enabled": false}
        }))
        .unwrap()
    }

    #[test]
    fn test_config_keeps_unknown_fields() {
        let cfg = sample_config();
        assert!(cfg.extra.contains_key("scheduler"));
        assert_eq!(
            cfg.inputs[0].extra.get("latency"),
            Some(&serde_json::json!(200))
        );
    }

    #[test]
    fn test_codec_labels() {
        let cfg = sample_config();
        assert_eq!(cfg.video_codecs(), vec!["x264enc", "x265enc"]);
        assert_eq!(cfg.audio_codec(), "avenc_aac");

        let bare = ChannelConfig::new("bare");
        assert_eq!(bare.video_codecs(), vec!["Passthrough"]);
        assert_eq!(bare.audio_codec(), "Passthrough");
    }

    #[test]
    fn test_input_kind_detection() {
        assert_eq!(sample_config().input_kind(), Some(InputKind::Srt));
        assert_eq!(InputKind::detect("udpsrc"), Some(InputKind::Udp));
        assert_eq!(InputKind::detect("HLS"), Some(InputKind::Hls));
        assert_eq!(InputKind::detect("file"), None);
    }

    #[test]
    fn test_shape_diff_ignores_opaque_fields() {
        let old = sample_config();
        let mut new = old.clone();
        new.extra
            .insert("scheduler".into(), serde_json::json!({"enabled": true}));
        assert!(ShapeDiff::between(&old.shape(), &new.shape()).is_empty());

        new.outputs[0].port = Some(PortValue::Number(5002));
        let diff = ShapeDiff::between(&old.shape(), &new.shape());
        assert!(diff.outputs);
        assert!(!diff.input && !diff.video && !diff.audio);
    }

    #[test]
    fn test_status_is_blank_when_stopped() {
        let runtime = RuntimeInfo {
            is_running: false,
            process: Some(ProcessInfo {
                pid: Some(42),
                ..Default::default()
            }),
        };
        assert_eq!(
            ChannelStatus::derive(Some(&runtime), None),
            ChannelStatus::stopped()
        );

        let running = RuntimeInfo {
            is_running: true,
            process: None,
        };
        let status = ChannelStatus::derive(Some(&running), None);
        assert!(status.is_running);
        assert_eq!(status.pid, None);
    }
}
