//! Per-channel output telemetry pollers.
//!
//! Each running, attached channel gets one background task that fetches the
//! latest sample for every output slot on a fixed interval and classifies it
//! as fresh or stale. Pollers never touch the board: they send
//! `SlotUpdate`s to the engine, which applies them only if the channel is
//! still cached and running. Cancellation is explicit: the reconciliation
//! cache stops a poller when the channel stops and calls `detached` when it
//! evicts the channel.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::ControlPlane;
use crate::clock::Clock;
use crate::format;
use crate::model::{ChannelName, OutputStatSample};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_AFTER_MS: u64 = 10_000;

/// What an output slot should show after one poll.
#[derive(Clone, Debug, PartialEq)]
pub enum SlotDisplay {
    /// Fresh sample, formatted bitrate.
    Show(String),
    NoSignal,
    /// Inside the grace window: leave the previous text alone.
    Keep,
}

/// Freshness bookkeeping for the output slots of one channel.
#[derive(Clone, Debug)]
pub struct StalenessTracker {
    stale_after_ms: u64,
    last_good: BTreeMap<usize, u64>,
}

impl StalenessTracker {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            stale_after_ms,
            last_good: BTreeMap::new(),
        }
    }

    /// A sample is fresh iff `now - timestamp` is strictly below the window.
    pub fn is_fresh(&self, sample: &OutputStatSample, now_ms: u64) -> bool {
        let sample_ms = (sample.timestamp_seconds * 1000.0) as i64;
        (now_ms as i64 - sample_ms) < self.stale_after_ms as i64
    }

    pub fn observe(
        &mut self,
        slot: usize,
        sample: Option<&OutputStatSample>,
        now_ms: u64,
    ) -> SlotDisplay {
        if let Some(sample) = sample.filter(|s| self.is_fresh(s, now_ms)) {
            self.last_good.insert(slot, now_ms);
            return SlotDisplay::Show(format::bitrate(Some(sample.bitrate_mbps)));
        }
        match self.last_good.get(&slot) {
            Some(last) if now_ms.saturating_sub(*last) <= self.stale_after_ms => SlotDisplay::Keep,
            _ => {
                self.last_good.remove(&slot);
                SlotDisplay::NoSignal
            }
        }
    }

    pub fn last_good(&self, slot: usize) -> Option<u64> {
        self.last_good.get(&slot).copied()
    }

    /// Forget slots that no longer exist after the output list shrank.
    pub fn truncate(&mut self, slots: usize) {
        self.last_good.retain(|slot, _| *slot < slots);
    }
}

/// Sent from a poller to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotUpdate {
    /// Identifies the poller instance that produced the update.
    pub poller: u64,
    pub channel: ChannelName,
    pub slot: usize,
    pub display: SlotDisplay,
}

/// Hook invoked synchronously when the cache evicts a channel.
pub trait DetachListener: Send + Sync {
    fn detached(&self, channel: &str);
}

#[derive(Clone, Copy, Debug)]
pub struct PollSettings {
    pub interval: Duration,
    pub stale_after_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

struct PollerEntry {
    id: u64,
    task: JoinHandle<()>,
    slots: watch::Sender<usize>,
}

struct Registry {
    backend: Arc<dyn ControlPlane>,
    entries: BTreeMap<ChannelName, PollerEntry>,
    next_id: u64,
}

/// Registry of running pollers, keyed by channel.
#[derive(Clone)]
pub struct PollerSet {
    registry: Arc<Mutex<Registry>>,
    clock: Arc<dyn Clock>,
    updates: mpsc::Sender<SlotUpdate>,
    settings: PollSettings,
}

impl PollerSet {
    pub fn new(
        backend: Arc<dyn ControlPlane>,
        clock: Arc<dyn Clock>,
        updates: mpsc::Sender<SlotUpdate>,
        settings: PollSettings,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                backend,
                entries: BTreeMap::new(),
                next_id: 0,
            })),
            clock,
            updates,
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start polling `channel`. Returns `false` if a poller is already active,
    /// in which case only its slot count is refreshed.
    pub fn start(&self, channel: &str, slots: usize) -> bool {
        let mut reg = self.lock();
        if let Some(entry) = reg.entries.get(channel) {
            if !entry.task.is_finished() {
                entry.slots.send_if_modified(|n| {
                    let changed = *n != slots;
                    *n = slots;
                    changed
                });
                return false;
            }
        }

        reg.next_id += 1;
        let id = reg.next_id;
        let (slots_tx, slots_rx) = watch::channel(slots);
        let task = tokio::spawn(run_poller(
            PollerRun {
                id,
                channel: channel.to_string(),
                backend: reg.backend.clone(),
                clock: self.clock.clone(),
                updates: self.updates.clone(),
                settings: self.settings,
            },
            slots_rx,
        ));
        reg.entries.insert(
            channel.to_string(),
            PollerEntry {
                id,
                task,
                slots: slots_tx,
            },
        );
        info!("poller started for {} ({} outputs)", channel, slots);
        true
    }

    pub fn stop(&self, channel: &str) -> bool {
        match self.lock().entries.remove(channel) {
            Some(entry) => {
                entry.task.abort();
                info!("poller stopped for {}", channel);
                true
            }
            None => false,
        }
    }

    pub fn set_slots(&self, channel: &str, slots: usize) {
        if let Some(entry) = self.lock().entries.get(channel) {
            entry.slots.send_replace(slots);
        }
    }

    pub fn is_active(&self, channel: &str) -> bool {
        self.lock()
            .entries
            .get(channel)
            .is_some_and(|e| !e.task.is_finished())
    }

    pub fn active(&self) -> Vec<ChannelName> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, e)| !e.task.is_finished())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Updates already queued by a poller that has since been stopped (or
    /// replaced) must not reach the board.
    pub fn accepts(&self, update: &SlotUpdate) -> bool {
        self.lock()
            .entries
            .get(&update.channel)
            .is_some_and(|e| e.id == update.poller)
    }

    pub fn stop_all(&self) {
        let mut reg = self.lock();
        let entries = std::mem::take(&mut reg.entries);
        if !entries.is_empty() {
            debug!("stopping {} pollers", entries.len());
        }
        for (_, entry) in entries {
            entry.task.abort();
        }
    }

    /// Point future pollers at another server. Running pollers are stopped.
    pub fn rebind(&self, backend: Arc<dyn ControlPlane>) {
        self.stop_all();
        self.lock().backend = backend;
    }
}

impl DetachListener for PollerSet {
    fn detached(&self, channel: &str) {
        self.stop(channel);
    }
}

struct PollerRun {
    id: u64,
    channel: ChannelName,
    backend: Arc<dyn ControlPlane>,
    clock: Arc<dyn Clock>,
    updates: mpsc::Sender<SlotUpdate>,
    settings: PollSettings,
}

async fn run_poller(run: PollerRun, mut slots: watch::Receiver<usize>) {
    let mut tracker = StalenessTracker::new(run.settings.stale_after_ms);
    let mut ticker = tokio::time::interval(run.settings.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let slot_count = *slots.borrow_and_update();
        tracker.truncate(slot_count);

        for slot in 0..slot_count {
            let sample = match run.backend.output_stats(&run.channel, slot).await {
                Ok(sample) => sample,
                Err(e) => {
                    debug!("output {} of {}: {}", slot, run.channel, e);
                    None
                }
            };
            let display = tracker.observe(slot, sample.as_ref(), run.clock.now_millis());
            if display == SlotDisplay::Keep {
                continue;
            }
            let update = SlotUpdate {
                poller: run.id,
                channel: run.channel.clone(),
                slot,
                display,
            };
            if run.updates.send(update).await.is_err() {
                // Engine gone.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fake::FakeControlPlane;
    use crate::model::ChannelConfig;

    const T0: u64 = 1_700_000_000_000;

    fn sample(ts_ms: u64, mbps: f64) -> OutputStatSample {
        OutputStatSample {
            output_index: 0,
            bitrate_mbps: mbps,
            timestamp_seconds: ts_ms as f64 / 1000.0,
        }
    }

    #[test]
    fn test_fresh_boundary_is_strict() {
        let tracker = StalenessTracker::new(10_000);
        assert!(tracker.is_fresh(&sample(T0 - 9_999, 1.0), T0));
        assert!(!tracker.is_fresh(&sample(T0 - 10_000, 1.0), T0));
    }

    #[test]
    fn test_never_seen_slot_shows_no_signal() {
        let mut tracker = StalenessTracker::new(10_000);
        assert_eq!(tracker.observe(0, None, T0), SlotDisplay::NoSignal);
        let stale = sample(T0 - 10_000, 3.0);
        assert_eq!(tracker.observe(0, Some(&stale), T0), SlotDisplay::NoSignal);
    }

    #[test]
    fn test_grace_window_keeps_text() {
        let mut tracker = StalenessTracker::new(10_000);
        assert_eq!(
            tracker.observe(0, Some(&sample(T0, 5.25)), T0),
            SlotDisplay::Show("5.25 Mbps".into())
        );
        // last good 9s ago, poll missed
        assert_eq!(tracker.observe(0, None, T0 + 9_000), SlotDisplay::Keep);
        // last good 12s ago
        assert_eq!(tracker.observe(0, None, T0 + 12_000), SlotDisplay::NoSignal);
        assert_eq!(tracker.last_good(0), None);
    }

    #[test]
    fn test_slots_are_independent() {
        let mut tracker = StalenessTracker::new(10_000);
        tracker.observe(0, Some(&sample(T0, 1.0)), T0);
        assert_eq!(tracker.observe(1, None, T0 + 1_000), SlotDisplay::NoSignal);
        assert_eq!(tracker.observe(0, None, T0 + 1_000), SlotDisplay::Keep);
        tracker.truncate(0);
        assert_eq!(tracker.last_good(0), None);
    }

    fn poller_set(fake: &FakeControlPlane, clock: &ManualClock) -> (PollerSet, mpsc::Receiver<SlotUpdate>) {
        let (tx, rx) = mpsc::channel(64);
        let set = PollerSet::new(
            Arc::new(fake.clone()),
            Arc::new(clock.clone()),
            tx,
            PollSettings::default(),
        );
        (set, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_reports_fresh_then_no_signal() {
        let clock = ManualClock::new(T0);
        let fake = FakeControlPlane::with_clock(Arc::new(clock.clone()));
        fake.add_channel(ChannelConfig::new("a"), true);
        fake.set_output_sample("a", Some(sample(T0 - 1_000, 7.5)));

        let (set, mut rx) = poller_set(&fake, &clock);
        assert!(set.start("a", 1));
        assert!(!set.start("a", 1));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.display, SlotDisplay::Show("7.50 Mbps".into()));
        assert!(set.accepts(&first));

        // sample stops updating; 12s later the slot goes dark
        clock.advance(12_000);
        tokio::time::advance(Duration::from_secs(5)).await;
        let next = rx.recv().await.unwrap();
        assert_eq!(next.display, SlotDisplay::NoSignal);

        set.stop_all();
        assert!(set.active().is_empty());
        assert!(!set.accepts(&next));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_stops_fetching() {
        let clock = ManualClock::new(T0);
        let fake = FakeControlPlane::with_clock(Arc::new(clock.clone()));
        fake.add_channel(ChannelConfig::new("b"), true);

        let (set, mut rx) = poller_set(&fake, &clock);
        set.start("b", 2);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        let fetched = fake.telemetry_fetches("b");
        assert_eq!(fetched, 2);

        set.detached("b");
        assert!(!set.is_active("b"));
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(fake.telemetry_fetches("b"), fetched);
    }
}
