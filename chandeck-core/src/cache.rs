//! Reconciliation cache.
//!
//! Owns the board and one `ChannelRecord` per channel seen in the last
//! directory fetch. Each `reconcile` pass walks the fetched configs in server
//! order and applies the smallest set of field writes that makes the board
//! match them:
//!
//! 1. unknown names get a new unit from the `ElementBinder`, recorded as
//!    stopped, then run through steps 2-4 before being attached;
//! 2. structural changes (input, codecs, outputs) patch only the fields that
//!    changed;
//! 3. running-state transitions swap status and toggle, and start or stop the
//!    channel's poller;
//! 4. runtime values (pid/cpu, uptime, bitrate) are written only when they
//!    differ from the cached ones.
//!
//! Names missing from the fetch are evicted afterwards. After every pass each
//! record holds exactly the `(config, status)` pair that was last applied.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::binder::ElementBinder;
use crate::board::{Board, LayoutMode, Notice, NoticeLevel, RenderHandles, StatusIndicator};
use crate::directory::DirectorySnapshot;
use crate::format;
use crate::gateway::CommandOutcome;
use crate::model::{
    ChannelConfig, ChannelName, ChannelStatus, RuntimeIndex, ShapeDiff, StatsIndex,
};
use crate::poller::{DetachListener, PollerSet, SlotDisplay, SlotUpdate};

#[derive(Clone, Debug)]
pub struct ChannelRecord {
    pub config: ChannelConfig,
    pub status: ChannelStatus,
    pub handles: RenderHandles,
}

/// What one reconcile pass did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    pub created: Vec<ChannelName>,
    pub evicted: Vec<ChannelName>,
    pub started: Vec<ChannelName>,
    pub stopped: Vec<ChannelName>,
    /// Board field writes issued during the pass.
    pub writes: u64,
}

pub struct ReconciliationCache {
    board: Board,
    records: BTreeMap<ChannelName, ChannelRecord>,
    pollers: PollerSet,
    listeners: Vec<Arc<dyn DetachListener>>,
}

impl ReconciliationCache {
    pub fn new(layout: LayoutMode, pollers: PollerSet) -> Self {
        Self {
            board: Board::new(layout),
            records: BTreeMap::new(),
            listeners: vec![Arc::new(pollers.clone())],
            pollers,
        }
    }

    /// Register an extra hook called synchronously on every eviction.
    pub fn subscribe(&mut self, listener: Arc<dyn DetachListener>) {
        self.listeners.push(listener);
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn pollers(&self) -> &PollerSet {
        &self.pollers
    }

    pub fn record(&self, name: &str) -> Option<&ChannelRecord> {
        self.records.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &ChannelName> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn apply(&mut self, snapshot: &DirectorySnapshot) -> ReconcileReport {
        self.reconcile(&snapshot.configs, &snapshot.runtime_index, &snapshot.stats)
    }

    pub fn reconcile(
        &mut self,
        configs: &[ChannelConfig],
        runtime: &RuntimeIndex,
        stats: &StatsIndex,
    ) -> ReconcileReport {
        let writes_before = self.board.writes;
        let mut report = ReconcileReport::default();
        let mut seen = BTreeSet::new();

        for config in configs {
            if !seen.insert(config.name.as_str()) {
                warn!("duplicate channel {} in directory, ignoring repeat", config.name);
                continue;
            }
            let fresh = ChannelStatus::derive(runtime.get(&config.name), stats.get(&config.name));

            let created = !self.records.contains_key(&config.name);
            if created {
                let handles =
                    ElementBinder::build(&mut self.board, &self.pollers, config, &fresh);
                self.records.insert(
                    config.name.clone(),
                    ChannelRecord {
                        config: config.clone(),
                        status: ChannelStatus::stopped(),
                        handles,
                    },
                );
                report.created.push(config.name.clone());
            }

            let Some(record) = self.records.get_mut(&config.name) else {
                continue;
            };

            patch_structure(&mut self.board, &self.pollers, record, config);

            let was_running = record.status.is_running;
            if was_running != fresh.is_running {
                transition(&mut self.board, &self.pollers, record, &fresh);
                if fresh.is_running {
                    report.started.push(config.name.clone());
                } else {
                    report.stopped.push(config.name.clone());
                }
            }
            if fresh.is_running {
                patch_runtime(&mut self.board, record, &fresh, was_running != fresh.is_running);
            }
            record.status = fresh;

            if created {
                self.board.attach(record.handles.container);
            }
        }

        let gone: Vec<ChannelName> = self
            .records
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();
        for name in gone {
            self.evict(&name);
            report.evicted.push(name);
        }

        report.writes = self.board.writes - writes_before;
        if !report.created.is_empty() || !report.evicted.is_empty() {
            info!(
                "reconciled {} channels: +{} -{}",
                self.records.len(),
                report.created.len(),
                report.evicted.len()
            );
        } else {
            debug!("reconciled {} channels, {} writes", self.records.len(), report.writes);
        }
        report
    }

    /// Detach the unit, notify the detach hooks (which stop the poller) and
    /// drop the record.
    pub fn evict(&mut self, name: &str) -> bool {
        let Some(record) = self.records.remove(name) else {
            return false;
        };
        self.board.detach(record.handles.container);
        for listener in &self.listeners {
            listener.detached(name);
        }
        debug!("evicted {}", name);
        true
    }

    /// Evict everything. The next reconcile rebuilds from scratch.
    pub fn clear(&mut self) {
        let names: Vec<ChannelName> = self.records.keys().cloned().collect();
        for name in &names {
            self.evict(name);
        }
        self.board.clear();
    }

    /// Clear and switch layout; units of one layout are not reused in another.
    pub fn reset(&mut self, layout: LayoutMode) {
        self.clear();
        self.board.layout = layout;
    }

    /// The toggle state the operator currently sees, if the channel is shown.
    pub fn toggle_state(&self, name: &str) -> Option<bool> {
        let record = self.records.get(name)?;
        self.board.unit(record.handles.container).map(|v| v.toggle)
    }

    /// Flip the toggle before the command is sent. Cached status is left
    /// alone until a directory refresh confirms the new state.
    pub fn optimistic_toggle(&mut self, name: &str, should_start: bool) -> bool {
        let Some(record) = self.records.get(name) else {
            return false;
        };
        self.board.set_toggle(record.handles.toggle, should_start)
    }

    pub fn revert_toggle(&mut self, name: &str, should_start: bool) -> bool {
        let Some(record) = self.records.get(name) else {
            return false;
        };
        self.board.set_toggle(record.handles.toggle, !should_start)
    }

    /// Apply a command result to the board. Returns `true` when a refresh
    /// should follow to confirm the new state.
    pub fn settle_command(&mut self, outcome: &CommandOutcome) -> bool {
        match outcome {
            CommandOutcome::Accepted {
                channel,
                should_start,
                message,
            } => {
                let text = message.clone().unwrap_or_else(|| {
                    format!(
                        "{} {}",
                        if *should_start { "starting" } else { "stopping" },
                        channel
                    )
                });
                self.board.set_notice(Some(Notice {
                    level: NoticeLevel::Info,
                    text,
                }));
                true
            }
            CommandOutcome::Failed {
                should_start,
                error,
            } => {
                self.revert_toggle(error.channel(), *should_start);
                self.board.set_notice(Some(Notice {
                    level: NoticeLevel::Error,
                    text: error.to_string(),
                }));
                false
            }
        }
    }

    /// Apply a poller result. Ignored unless the channel is still cached,
    /// running and attached.
    pub fn apply_slot_update(&mut self, update: &SlotUpdate) -> bool {
        let Some(record) = self.records.get(&update.channel) else {
            return false;
        };
        if !record.status.is_running || !self.board.is_attached(record.handles.container) {
            return false;
        }
        let text = match &update.display {
            SlotDisplay::Show(text) => text.clone(),
            SlotDisplay::NoSignal => format::NO_SIGNAL.to_string(),
            SlotDisplay::Keep => return false,
        };
        let current = self
            .board
            .unit(record.handles.container)
            .and_then(|v| v.outputs.get(update.slot))
            .map(|o| o.bitrate.as_str());
        if current == Some(text.as_str()) {
            return false;
        }
        self.board
            .set_output_bitrate(record.handles.outputs, update.slot, text)
    }
}

fn patch_structure(
    board: &mut Board,
    pollers: &PollerSet,
    record: &mut ChannelRecord,
    config: &ChannelConfig,
) {
    let diff = ShapeDiff::between(&record.config.shape(), &config.shape());
    if !diff.is_empty() {
        let h = &record.handles;
        if diff.input {
            let uri = config.primary_input().and_then(|i| i.uri.as_deref());
            board.set_text(h.uri, format::uri(uri));
        }
        if diff.video {
            board.set_video_codecs(h.video_codec, config.video_codecs());
        }
        if diff.audio {
            board.set_text(h.audio_codec, config.audio_codec());
        }
        if diff.outputs {
            board.set_outputs(h.outputs, ElementBinder::output_lines(config));
            pollers.set_slots(&config.name, config.outputs.len());
        }
        debug!("patched {}: {:?}", config.name, diff);
    }
    if record.config != *config {
        record.config = config.clone();
    }
}

fn transition(
    board: &mut Board,
    pollers: &PollerSet,
    record: &ChannelRecord,
    fresh: &ChannelStatus,
) {
    let h = &record.handles;
    board.set_status(h.status, StatusIndicator::from_running(fresh.is_running));
    board.set_toggle(h.toggle, fresh.is_running);

    if fresh.is_running {
        pollers.start(&record.config.name, record.config.outputs.len());
        info!("{} is running", record.config.name);
    } else {
        board.set_text(h.uptime, format::UNKNOWN.to_string());
        board.set_text(h.bitrate, format::STOPPED_BITRATE.to_string());
        board.set_text(h.pid_cpu, String::new());
        board.reset_output_bitrates(h.outputs, format::NO_SIGNAL);
        pollers.stop(&record.config.name);
        info!("{} stopped", record.config.name);
    }
}

fn patch_runtime(board: &mut Board, record: &ChannelRecord, fresh: &ChannelStatus, force: bool) {
    let old = &record.status;
    let h = &record.handles;
    if force || old.pid != fresh.pid || old.cpu_usage != fresh.cpu_usage {
        board.set_text(
            h.pid_cpu,
            format::pid_cpu(fresh.pid, fresh.cpu_usage, board.layout),
        );
    }
    if force || old.uptime_seconds != fresh.uptime_seconds {
        board.set_text(h.uptime, format::uptime(fresh.uptime_seconds));
    }
    if force || old.bitrate_mbps != fresh.bitrate_mbps {
        board.set_text(h.bitrate, format::bitrate(fresh.bitrate_mbps));
    }
}
