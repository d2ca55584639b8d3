//! Refresh cycle scheduling.
//!
//! Pure state machine; the engine feeds it ticks, visibility changes and
//! completions and spawns a directory fetch whenever it hands back a
//! generation number.
//!
//! Overlap policy is coalescing: at most one fetch is in flight. Requests
//! that arrive meanwhile mark the scheduler dirty, and a single follow-up
//! cycle starts when the in-flight one finishes. Server and layout switches
//! bump the generation so that a fetch started before the switch is not
//! applied after it.

use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleEnd {
    /// The finished cycle belongs to the current generation.
    pub apply: bool,
    /// Start this follow-up cycle now.
    pub follow_up: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct RefreshScheduler {
    server: Option<String>,
    visible: bool,
    generation: u64,
    in_flight: Option<u64>,
    dirty: bool,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            server: None,
            visible: true,
            generation: 0,
            in_flight: None,
            dirty: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    fn request(&mut self) -> Option<u64> {
        self.server.as_ref()?;
        if self.in_flight.is_some() {
            self.dirty = true;
            debug!("cycle in flight, coalescing request");
            return None;
        }
        self.in_flight = Some(self.generation);
        Some(self.generation)
    }

    /// New server: invalidate anything in flight and refresh immediately.
    pub fn on_server_selected(&mut self, server: impl Into<String>) -> Option<u64> {
        self.server = Some(server.into());
        self.generation += 1;
        self.dirty = false;
        self.request()
    }

    /// Periodic tick. Suspended while hidden.
    pub fn on_tick(&mut self) -> Option<u64> {
        if !self.visible {
            return None;
        }
        self.request()
    }

    /// Becoming visible again triggers one immediate cycle.
    pub fn on_visibility(&mut self, visible: bool) -> Option<u64> {
        let was_visible = self.visible;
        self.visible = visible;
        if visible && !was_visible {
            self.request()
        } else {
            None
        }
    }

    /// Layout switch: the display was cleared, rebuild from a fresh fetch.
    pub fn on_layout(&mut self) -> Option<u64> {
        self.generation += 1;
        self.dirty = false;
        self.request()
    }

    /// Out-of-band refresh (operator request, accepted command).
    pub fn request_now(&mut self) -> Option<u64> {
        self.request()
    }

    pub fn on_cycle_finished(&mut self, generation: u64) -> CycleEnd {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        let apply = generation == self.generation;
        if !apply {
            debug!(
                "discarding cycle from generation {} (now {})",
                generation, self.generation
            );
        }

        // A switch while this cycle was in flight still needs its own fetch.
        let stale_switch = !apply && self.in_flight.is_none();
        let follow_up = if self.dirty || stale_switch {
            self.dirty = false;
            self.request()
        } else {
            None
        };
        CycleEnd { apply, follow_up }
    }
}
