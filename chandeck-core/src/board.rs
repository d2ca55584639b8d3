//! Semantic render state.
//!
//! The board is what the dashboard *shows*, as plain values: one `UnitView`
//! per attached channel, in display order. Presentation layers (the TUI, the
//! `list` subcommand) read a snapshot of it; only the reconciliation cache
//! writes to it, always through `FieldHandle`s handed out at bind time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ChannelName;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    #[default]
    Compact,
    Table,
}

impl LayoutMode {
    pub fn label(&self) -> &'static str {
        match self {
            LayoutMode::Compact => "compact",
            LayoutMode::Table => "table",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            LayoutMode::Compact => LayoutMode::Table,
            LayoutMode::Table => LayoutMode::Compact,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Status,
    Uri,
    PidCpu,
    Bitrate,
    Uptime,
    VideoCodec,
    AudioCodec,
    Outputs,
    Toggle,
}

/// Stable reference to one field of one presentation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldHandle {
    pub unit: UnitId,
    pub field: Field,
}

/// The full handle set of a unit. Identical for both layout modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderHandles {
    pub container: UnitId,
    pub status: FieldHandle,
    pub uri: FieldHandle,
    pub pid_cpu: FieldHandle,
    pub bitrate: FieldHandle,
    pub uptime: FieldHandle,
    pub video_codec: FieldHandle,
    pub audio_codec: FieldHandle,
    pub outputs: FieldHandle,
    pub toggle: FieldHandle,
}

impl RenderHandles {
    pub fn for_unit(unit: UnitId) -> Self {
        let h = |field| FieldHandle { unit, field };
        Self {
            container: unit,
            status: h(Field::Status),
            uri: h(Field::Uri),
            pid_cpu: h(Field::PidCpu),
            bitrate: h(Field::Bitrate),
            uptime: h(Field::Uptime),
            video_codec: h(Field::VideoCodec),
            audio_codec: h(Field::AudioCodec),
            outputs: h(Field::Outputs),
            toggle: h(Field::Toggle),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusIndicator {
    Running,
    #[default]
    Stopped,
}

impl StatusIndicator {
    pub fn from_running(running: bool) -> Self {
        if running {
            StatusIndicator::Running
        } else {
            StatusIndicator::Stopped
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputLine {
    pub label: String,
    pub bitrate: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnitView {
    pub channel: ChannelName,
    pub layout: LayoutMode,
    pub status: StatusIndicator,
    pub uri: String,
    pub pid_cpu: String,
    pub bitrate: String,
    pub uptime: String,
    pub video_codecs: Vec<String>,
    pub audio_codec: String,
    pub outputs: Vec<OutputLine>,
    /// Checked = the operator sees the channel as on.
    pub toggle: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message for the operator, e.g. a rejected start command.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct Board {
    pub layout: LayoutMode,
    pub server: Option<String>,
    units: BTreeMap<UnitId, UnitView>,
    order: Vec<UnitId>,
    next_unit: u64,
    /// Replaces the channel list when the configuration directory is down.
    pub error_banner: Option<String>,
    pub notice: Option<Notice>,
    /// Bumped on every change; the engine publishes snapshots when it moves.
    pub revision: u64,
    /// Number of field writes issued through handles.
    pub writes: u64,
}

impl Board {
    pub fn new(layout: LayoutMode) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Create a detached unit. It becomes visible once `attach`ed.
    pub fn create(&mut self, view: UnitView) -> RenderHandles {
        self.next_unit += 1;
        let id = UnitId(self.next_unit);
        self.units.insert(id, view);
        self.revision += 1;
        RenderHandles::for_unit(id)
    }

    /// Append a unit to the display order.
    pub fn attach(&mut self, unit: UnitId) -> bool {
        if !self.units.contains_key(&unit) || self.order.contains(&unit) {
            return false;
        }
        self.order.push(unit);
        self.revision += 1;
        true
    }

    pub fn detach(&mut self, unit: UnitId) -> Option<UnitView> {
        let view = self.units.remove(&unit)?;
        self.order.retain(|u| *u != unit);
        self.revision += 1;
        Some(view)
    }

    pub fn is_attached(&self, unit: UnitId) -> bool {
        self.order.contains(&unit)
    }

    /// Drop every unit, e.g. on layout or server switch.
    pub fn clear(&mut self) {
        self.units.clear();
        self.order.clear();
        self.error_banner = None;
        self.revision += 1;
    }

    pub fn unit(&self, unit: UnitId) -> Option<&UnitView> {
        self.units.get(&unit)
    }

    /// Attached units in display order.
    pub fn visible(&self) -> impl Iterator<Item = &UnitView> {
        self.order.iter().filter_map(|id| self.units.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn set_banner(&mut self, banner: Option<String>) {
        if self.error_banner != banner {
            self.error_banner = banner;
            self.revision += 1;
        }
    }

    pub fn set_notice(&mut self, notice: Option<Notice>) {
        if self.notice != notice {
            self.notice = notice;
            self.revision += 1;
        }
    }

    fn write<F>(&mut self, handle: FieldHandle, f: F) -> bool
    where
        F: FnOnce(&mut UnitView),
    {
        let Some(view) = self.units.get_mut(&handle.unit) else {
            return false;
        };
        f(view);
        self.writes += 1;
        self.revision += 1;
        true
    }

    /// Write a text field. Handles to non-text fields are refused.
    pub fn set_text(&mut self, handle: FieldHandle, text: String) -> bool {
        let slot: fn(&mut UnitView) -> &mut String = match handle.field {
            Field::Uri => |v| &mut v.uri,
            Field::PidCpu => |v| &mut v.pid_cpu,
            Field::Bitrate => |v| &mut v.bitrate,
            Field::Uptime => |v| &mut v.uptime,
            Field::AudioCodec => |v| &mut v.audio_codec,
            _ => return false,
        };
        self.write(handle, |v| *slot(v) = text)
    }

    pub fn set_status(&mut self, handle: FieldHandle, status: StatusIndicator) -> bool {
        self.write(handle, |v| v.status = status)
    }

    pub fn set_toggle(&mut self, handle: FieldHandle, checked: bool) -> bool {
        self.write(handle, |v| v.toggle = checked)
    }

    pub fn set_video_codecs(&mut self, handle: FieldHandle, codecs: Vec<String>) -> bool {
        self.write(handle, |v| v.video_codecs = codecs)
    }

    /// Rebuild the whole output list.
    pub fn set_outputs(&mut self, handle: FieldHandle, outputs: Vec<OutputLine>) -> bool {
        self.write(handle, |v| v.outputs = outputs)
    }

    /// Bitrate text of a single output slot. Out-of-range slots are ignored.
    pub fn set_output_bitrate(&mut self, handle: FieldHandle, slot: usize, text: String) -> bool {
        let in_range = self
            .units
            .get(&handle.unit)
            .is_some_and(|v| slot < v.outputs.len());
        if !in_range {
            return false;
        }
        self.write(handle, |v| v.outputs[slot].bitrate = text)
    }

    /// Set every output slot to the same text.
    pub fn reset_output_bitrates(&mut self, handle: FieldHandle, text: &str) -> bool {
        self.write(handle, |v| {
            for line in &mut v.outputs {
                line.bitrate = text.to_string();
            }
        })
    }
}
