//! The dashboard engine.
//!
//! `Dashboard` is a single-owner actor: one task owns the reconciliation
//! cache, the poller registry, the gateway and the scheduler. Operator input
//! arrives as `DashCommand`s; directory results, poller samples and command
//! outcomes come back from spawned tasks as internal events. Every cache
//! mutation therefore happens on this one task, and after each event the
//! board is published to readers through `Arc<RwLock<Board>>`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::api::{BackendFactory, ControlPlane, Disconnected};
use crate::board::{Board, LayoutMode};
use crate::cache::ReconciliationCache;
use crate::clock::Clock;
use crate::directory::{ChannelDirectory, DirectoryError, DirectorySnapshot};
use crate::gateway::{CommandOutcome, ControlGateway};
use crate::model::ChannelName;
use crate::poller::{PollSettings, PollerSet, SlotUpdate};
use crate::scheduler::RefreshScheduler;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Commands that can be sent to the dashboard engine
#[derive(Clone, Debug, PartialEq)]
pub enum DashCommand {
    /// Bind to a server and refresh immediately
    SelectServer(String),
    /// Terminal focus gained/lost
    SetVisible(bool),
    /// Switch layout; clears and rebuilds every unit
    SetLayout(LayoutMode),
    /// Flip a channel's toggle and send the matching command
    Toggle { channel: ChannelName },
    /// Start or stop explicitly
    SetRunning {
        channel: ChannelName,
        should_start: bool,
    },
    RefreshNow,
    DismissNotice,
    Shutdown,
}

enum EngineEvent {
    Directory {
        generation: u64,
        result: Result<DirectorySnapshot, DirectoryError>,
    },
    Command {
        /// Server binding the command was sent under.
        epoch: u64,
        outcome: CommandOutcome,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct EngineSettings {
    pub refresh_interval: Duration,
    pub poll: PollSettings,
    pub layout: LayoutMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            poll: PollSettings::default(),
            layout: LayoutMode::default(),
        }
    }
}

/// Cloneable front door to a running `Dashboard`.
#[derive(Clone)]
pub struct DashboardHandle {
    commands: mpsc::Sender<DashCommand>,
    board: Arc<RwLock<Board>>,
}

impl DashboardHandle {
    pub async fn send(&self, command: DashCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Latest published board.
    pub async fn board(&self) -> Board {
        self.board.read().await.clone()
    }

    pub fn shared_board(&self) -> Arc<RwLock<Board>> {
        self.board.clone()
    }
}

struct Inbox {
    commands: mpsc::Receiver<DashCommand>,
    events: mpsc::Receiver<EngineEvent>,
    slots: mpsc::Receiver<SlotUpdate>,
}

pub struct Dashboard {
    factory: Arc<dyn BackendFactory>,
    settings: EngineSettings,
    backend: Arc<dyn ControlPlane>,
    /// Bumped on every server selection.
    server_epoch: u64,
    gateway: ControlGateway,
    cache: ReconciliationCache,
    scheduler: RefreshScheduler,
    events_tx: mpsc::Sender<EngineEvent>,
    published: Arc<RwLock<Board>>,
    published_revision: Option<u64>,
    inbox: Option<Inbox>,
}

impl Dashboard {
    /// Build the engine. Nothing is fetched until a server is selected.
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> (Self, DashboardHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (slots_tx, slots_rx) = mpsc::channel(256);

        let backend: Arc<dyn ControlPlane> = Arc::new(Disconnected::new("no server selected"));
        let pollers = PollerSet::new(backend.clone(), clock, slots_tx, settings.poll);
        let cache = ReconciliationCache::new(settings.layout, pollers);
        let published = Arc::new(RwLock::new(cache.board().clone()));

        let dashboard = Self {
            factory,
            settings,
            gateway: ControlGateway::new(backend.clone()),
            backend,
            server_epoch: 0,
            cache,
            scheduler: RefreshScheduler::new(),
            events_tx,
            published: published.clone(),
            published_revision: None,
            inbox: Some(Inbox {
                commands: commands_rx,
                events: events_rx,
                slots: slots_rx,
            }),
        };
        let handle = DashboardHandle {
            commands: commands_tx,
            board: published,
        };
        (dashboard, handle)
    }

    pub fn cache(&self) -> &ReconciliationCache {
        &self.cache
    }

    /// Run until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self) {
        let Some(mut inbox) = self.inbox.take() else {
            return;
        };
        let mut ticker = tokio::time::interval(self.settings.refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately; server selection covers it
        ticker.tick().await;

        info!("dashboard engine started");
        loop {
            tokio::select! {
                cmd = inbox.commands.recv() => match cmd {
                    None | Some(DashCommand::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(event) = inbox.events.recv() => self.handle_event(event),
                Some(update) = inbox.slots.recv() => {
                    if self.cache.pollers().accepts(&update) {
                        self.cache.apply_slot_update(&update);
                    }
                }
                _ = ticker.tick() => {
                    if let Some(generation) = self.scheduler.on_tick() {
                        self.spawn_cycle(generation);
                    }
                }
            }
            self.publish().await;
        }

        self.cache.pollers().stop_all();
        info!("dashboard engine stopped");
    }

    fn handle_command(&mut self, cmd: DashCommand) {
        debug!("command: {:?}", cmd);
        match cmd {
            DashCommand::SelectServer(server) => self.select_server(server),
            DashCommand::SetVisible(visible) => {
                if let Some(generation) = self.scheduler.on_visibility(visible) {
                    self.spawn_cycle(generation);
                }
            }
            DashCommand::SetLayout(layout) => {
                if layout == self.cache.board().layout {
                    return;
                }
                info!("layout switched to {}", layout.label());
                self.cache.reset(layout);
                if let Some(generation) = self.scheduler.on_layout() {
                    self.spawn_cycle(generation);
                }
            }
            DashCommand::Toggle { channel } => {
                let Some(checked) = self.cache.toggle_state(&channel) else {
                    warn!("toggle for unknown channel {}", channel);
                    return;
                };
                self.send_command(channel, !checked);
            }
            DashCommand::SetRunning {
                channel,
                should_start,
            } => self.send_command(channel, should_start),
            DashCommand::RefreshNow => {
                if let Some(generation) = self.scheduler.request_now() {
                    self.spawn_cycle(generation);
                }
            }
            DashCommand::DismissNotice => self.cache.board_mut().set_notice(None),
            DashCommand::Shutdown => {}
        }
    }

    fn select_server(&mut self, server: String) {
        info!("selecting server {}", server);
        self.backend = self.factory.connect(&server);
        self.server_epoch += 1;
        self.gateway = ControlGateway::new(self.backend.clone());
        // channel identity is per server
        self.cache.clear();
        self.cache.pollers().rebind(self.backend.clone());
        self.cache.board_mut().server = Some(server.clone());
        if let Some(generation) = self.scheduler.on_server_selected(server) {
            self.spawn_cycle(generation);
        }
    }

    fn send_command(&mut self, channel: ChannelName, should_start: bool) {
        if !self.cache.optimistic_toggle(&channel, should_start) {
            warn!("command for unknown channel {}", channel);
            return;
        }
        let gateway = self.gateway.clone();
        let events = self.events_tx.clone();
        let epoch = self.server_epoch;
        tokio::spawn(async move {
            let outcome = gateway.toggle(channel, should_start).await;
            let _ = events.send(EngineEvent::Command { epoch, outcome }).await;
        });
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Directory { generation, result } => {
                let end = self.scheduler.on_cycle_finished(generation);
                if end.apply {
                    self.apply_directory(result);
                }
                if let Some(generation) = end.follow_up {
                    self.spawn_cycle(generation);
                }
            }
            EngineEvent::Command { epoch, outcome } => {
                if epoch != self.server_epoch {
                    debug!(
                        "dropping reply for {} from a previous server",
                        outcome.channel()
                    );
                    return;
                }
                if self.cache.settle_command(&outcome) {
                    if let Some(generation) = self.scheduler.request_now() {
                        self.spawn_cycle(generation);
                    }
                }
            }
        }
    }

    fn apply_directory(&mut self, result: Result<DirectorySnapshot, DirectoryError>) {
        match result {
            Ok(snapshot) => {
                self.cache.board_mut().set_banner(None);
                self.cache.apply(&snapshot);
            }
            Err(e) => {
                error!("{}", e);
                // Nothing can be shown without configs.
                self.cache.clear();
                self.cache
                    .board_mut()
                    .set_banner(Some(format!("Error loading channels: {}", e)));
            }
        }
    }

    fn spawn_cycle(&self, generation: u64) {
        let backend = self.backend.clone();
        let events = self.events_tx.clone();
        debug!("refresh cycle {} on {}", generation, backend.name());
        tokio::spawn(async move {
            let result = ChannelDirectory::refresh(backend.as_ref()).await;
            let _ = events
                .send(EngineEvent::Directory { generation, result })
                .await;
        });
    }

    async fn publish(&mut self) {
        let revision = self.cache.board().revision;
        if self.published_revision == Some(revision) {
            return;
        }
        *self.published.write().await = self.cache.board().clone();
        self.published_revision = Some(revision);
    }
}

/// One directory pass rendered into a board, for non-interactive callers.
pub async fn render_once(
    backend: Arc<dyn ControlPlane>,
    clock: Arc<dyn Clock>,
    layout: LayoutMode,
) -> Result<Board, DirectoryError> {
    let snapshot = ChannelDirectory::refresh(backend.as_ref()).await?;
    let (slots_tx, _slots_rx) = mpsc::channel(1);
    let pollers = PollerSet::new(backend, clock, slots_tx, PollSettings::default());
    let mut cache = ReconciliationCache::new(layout, pollers);
    cache.apply(&snapshot);
    let board = cache.board().clone();
    cache.clear();
    Ok(board)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CommandAck;
    use crate::board::{NoticeLevel, StatusIndicator};
    use crate::clock::ManualClock;
    use crate::fake::{FakeControlPlane, FakeFactory};
    use crate::model::ChannelConfig;

    fn engine(fake: &FakeControlPlane) -> DashboardHandle {
        let (dash, handle) = Dashboard::new(
            Arc::new(FakeFactory::new(fake.clone())),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            EngineSettings::default(),
        );
        tokio::spawn(dash.run());
        handle
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn names(board: &Board) -> Vec<String> {
        board.visible().map(|v| v.channel.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_selection_renders_immediately() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("a"), true);
        fake.add_channel(ChannelConfig::new("b"), false);
        let handle = engine(&fake);

        handle.send(DashCommand::SelectServer("srv".into())).await;
        settle().await;

        let board = handle.board().await;
        assert_eq!(board.server.as_deref(), Some("srv"));
        assert_eq!(names(&board), vec!["a", "b"]);
        assert_eq!(fake.directory_fetches(), 1);
        handle.send(DashCommand::Shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_refresh_and_hidden_pauses() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("a"), false);
        let handle = engine(&fake);
        handle.send(DashCommand::SelectServer("srv".into())).await;
        settle().await;

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        settle().await;
        assert_eq!(fake.directory_fetches(), 2);

        handle.send(DashCommand::SetVisible(false)).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(fake.directory_fetches(), 2);

        handle.send(DashCommand::SetVisible(true)).await;
        settle().await;
        assert_eq!(fake.directory_fetches(), 3);
        handle.send(DashCommand::Shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_failure_replaces_list_with_banner() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("a"), true);
        let handle = engine(&fake);
        handle.send(DashCommand::SelectServer("srv".into())).await;
        settle().await;
        assert_eq!(handle.board().await.len(), 1);

        fake.fail_configs(Some("HTTP 502"));
        handle.send(DashCommand::RefreshNow).await;
        settle().await;
        let board = handle.board().await;
        assert!(board.is_empty());
        assert!(board.error_banner.as_deref().unwrap().contains("HTTP 502"));

        fake.fail_configs(None);
        handle.send(DashCommand::RefreshNow).await;
        settle().await;
        let board = handle.board().await;
        assert_eq!(board.error_banner, None);
        assert_eq!(names(&board), vec!["a"]);
        handle.send(DashCommand::Shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_round_trip() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("a"), false);
        let handle = engine(&fake);
        handle.send(DashCommand::SelectServer("srv".into())).await;
        settle().await;

        handle
            .send(DashCommand::Toggle {
                channel: "a".into(),
            })
            .await;
        settle().await;

        // accepted, then confirmed by the follow-up refresh
        let board = handle.board().await;
        let unit = board.visible().next().unwrap();
        assert_eq!(unit.status, StatusIndicator::Running);
        assert!(unit.toggle);
        assert_eq!(board.notice.as_ref().unwrap().level, NoticeLevel::Info);
        assert_eq!(fake.directory_fetches(), 2);
        handle.send(DashCommand::Shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_toggle_reverts() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("C"), false);
        fake.push_command_reply(Ok(CommandAck::error("busy")));
        let handle = engine(&fake);
        handle.send(DashCommand::SelectServer("srv".into())).await;
        settle().await;

        handle
            .send(DashCommand::Toggle {
                channel: "C".into(),
            })
            .await;
        settle().await;

        let board = handle.board().await;
        let unit = board.visible().next().unwrap();
        assert!(!unit.toggle);
        assert_eq!(unit.status, StatusIndicator::Stopped);
        let notice = board.notice.clone().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.text.contains("busy"));

        handle.send(DashCommand::DismissNotice).await;
        settle().await;
        assert!(handle.board().await.notice.is_none());
        handle.send(DashCommand::Shutdown).await;
    }

    /// Hands out a separate fake per server address.
    struct PerServer(std::collections::BTreeMap<String, FakeControlPlane>);

    impl BackendFactory for PerServer {
        fn connect(&self, server: &str) -> Arc<dyn ControlPlane> {
            match self.0.get(server) {
                Some(fake) => Arc::new(fake.clone()),
                None => Arc::new(Disconnected::new("unknown server")),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_from_previous_server_is_dropped() {
        let old = FakeControlPlane::new();
        old.add_channel(ChannelConfig::new("a"), false);
        old.push_command_reply(Ok(CommandAck::error("busy on old")));
        old.delay_commands(Some(Duration::from_secs(2)));
        let new = FakeControlPlane::new();
        new.add_channel(ChannelConfig::new("a"), true);

        let factory = PerServer(
            [("old".to_string(), old.clone()), ("new".to_string(), new.clone())]
                .into_iter()
                .collect(),
        );
        let (dash, handle) = Dashboard::new(
            Arc::new(factory),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            EngineSettings::default(),
        );
        tokio::spawn(dash.run());

        handle.send(DashCommand::SelectServer("old".into())).await;
        settle().await;
        handle
            .send(DashCommand::Toggle {
                channel: "a".into(),
            })
            .await;
        settle().await;
        handle.send(DashCommand::SelectServer("new".into())).await;
        settle().await;
        let fetches_before_reply = new.directory_fetches();

        // old server answers after the switch
        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        let board = handle.board().await;
        assert_eq!(board.server.as_deref(), Some("new"));
        let unit = board.visible().next().unwrap();
        assert_eq!(unit.status, StatusIndicator::Running);
        assert!(unit.toggle);
        assert_eq!(board.notice, None);
        assert_eq!(old.commands().len(), 1);
        assert!(new.commands().is_empty());
        // the sleep crosses no refresh tick, so nothing refetched either
        assert_eq!(new.directory_fetches(), fetches_before_reply);
        handle.send(DashCommand::Shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_layout_switch_rebuilds() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("a"), true);
        let handle = engine(&fake);
        handle.send(DashCommand::SelectServer("srv".into())).await;
        settle().await;

        handle.send(DashCommand::SetLayout(LayoutMode::Table)).await;
        settle().await;
        let board = handle.board().await;
        assert_eq!(board.layout, LayoutMode::Table);
        let unit = board.visible().next().unwrap();
        assert_eq!(unit.layout, LayoutMode::Table);
        assert_eq!(unit.status, StatusIndicator::Running);
        handle.send(DashCommand::Shutdown).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_once() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("a"), true);
        let board = render_once(
            Arc::new(fake.clone()),
            Arc::new(ManualClock::new(0)),
            LayoutMode::Table,
        )
        .await
        .unwrap();
        assert_eq!(names(&board), vec!["a"]);
        assert_eq!(board.visible().next().unwrap().status, StatusIndicator::Running);
    }
}
