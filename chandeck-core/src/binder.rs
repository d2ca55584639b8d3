//! Builds presentation units for channels.

use tracing::debug;

use crate::board::{Board, LayoutMode, OutputLine, RenderHandles, StatusIndicator, UnitView};
use crate::format;
use crate::model::{ChannelConfig, ChannelStatus};
use crate::poller::PollerSet;

pub struct ElementBinder;

impl ElementBinder {
    /// Create a detached unit for `config` on the board and return its
    /// handles. The unit starts out in the stopped state; the caller applies
    /// the real runtime status through the handles. If the channel is
    /// already running, its poller is started right away.
    pub fn build(
        board: &mut Board,
        pollers: &PollerSet,
        config: &ChannelConfig,
        status: &ChannelStatus,
    ) -> RenderHandles {
        let view = Self::unit_view(config, board.layout);
        let handles = board.create(view);
        debug!(
            "bound {} as {} ({} layout)",
            config.name,
            handles.container,
            board.layout.label()
        );
        if status.is_running {
            pollers.start(&config.name, config.outputs.len());
        }
        handles
    }

    pub fn unit_view(config: &ChannelConfig, layout: LayoutMode) -> UnitView {
        UnitView {
            channel: config.name.clone(),
            layout,
            status: StatusIndicator::Stopped,
            uri: format::uri(config.primary_input().and_then(|i| i.uri.as_deref())),
            pid_cpu: String::new(),
            bitrate: format::STOPPED_BITRATE.to_string(),
            uptime: format::UNKNOWN.to_string(),
            video_codecs: config.video_codecs(),
            audio_codec: config.audio_codec(),
            outputs: Self::output_lines(config),
            toggle: false,
        }
    }

    /// Output list with every slot waiting for its first poll.
    pub fn output_lines(config: &ChannelConfig) -> Vec<OutputLine> {
        config
            .outputs
            .iter()
            .map(|o| OutputLine {
                label: format::output_label(o),
                bitrate: format::SLOT_PENDING.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::board::Field;
    use crate::clock::SystemClock;
    use crate::fake::FakeControlPlane;
    use crate::model::{InputConfig, OutputConfig, PortValue};
    use crate::poller::{PollSettings, SlotUpdate};

    fn config() -> ChannelConfig {
        let mut cfg = ChannelConfig::new("news");
        cfg.inputs.push(InputConfig {
            uri: Some("srt://0.0.0.0:9000".into()),
            kind: Some("srtsrc".into()),
            ..Default::default()
        });
        cfg.outputs.push(OutputConfig {
            kind: "udpsink".into(),
            host: Some("239.0.0.1".into()),
            port: Some(PortValue::Number(5000)),
            ..Default::default()
        });
        cfg.outputs.push(OutputConfig {
            kind: "rtmpsink".into(),
            location: Some("rtmp://cdn/live".into()),
            ..Default::default()
        });
        cfg
    }

    fn pollers(fake: &FakeControlPlane) -> (PollerSet, mpsc::Receiver<SlotUpdate>) {
        let (tx, rx) = mpsc::channel(16);
        let set = PollerSet::new(
            Arc::new(fake.clone()),
            Arc::new(SystemClock),
            tx,
            PollSettings::default(),
        );
        (set, rx)
    }

    #[test]
    fn test_unit_view_content() {
        let view = ElementBinder::unit_view(&config(), LayoutMode::Compact);
        assert_eq!(view.uri, "srt://0.0.0.0:9000");
        assert_eq!(view.status, StatusIndicator::Stopped);
        assert_eq!(view.video_codecs, vec!["Passthrough"]);
        let labels: Vec<_> = view.outputs.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["UDP: 239.0.0.1:5000", "RTMP: rtmp://cdn/live"]);
        assert!(view.outputs.iter().all(|o| o.bitrate == "..."));
    }

    #[tokio::test]
    async fn test_layouts_share_handle_set() {
        let fake = FakeControlPlane::new();
        let (set, _rx) = pollers(&fake);
        let cfg = config();

        let mut compact = Board::new(LayoutMode::Compact);
        let mut table = Board::new(LayoutMode::Table);
        let a = ElementBinder::build(&mut compact, &set, &cfg, &ChannelStatus::stopped());
        let b = ElementBinder::build(&mut table, &set, &cfg, &ChannelStatus::stopped());
        assert_eq!(a, b);
        assert_eq!(a.toggle.field, Field::Toggle);
        assert_eq!(table.unit(b.container).unwrap().layout, LayoutMode::Table);
        // built detached
        assert!(compact.is_empty());
    }

    #[tokio::test]
    async fn test_running_channel_gets_poller_at_bind() {
        let fake = FakeControlPlane::new();
        let (set, _rx) = pollers(&fake);
        let mut board = Board::new(LayoutMode::Compact);

        let running = ChannelStatus {
            is_running: true,
            ..Default::default()
        };
        ElementBinder::build(&mut board, &set, &config(), &running);
        assert!(set.is_active("news"));

        let mut other = config();
        other.name = "idle".into();
        ElementBinder::build(&mut board, &set, &other, &ChannelStatus::stopped());
        assert!(!set.is_active("idle"));
        set.stop_all();
    }
}
