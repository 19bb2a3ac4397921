//! Shared signalling between the sampling driver, the capture follower and the
//! session controller.
//!
//! Everything the two loops coordinate on lives behind one mutex and one
//! condition variable: the recording flag, the quit flag, the session
//! generation, and two one-shot signal slots. `tick` carries the driver's
//! "start this shot" request to the follower and `done` carries the
//! follower's answer back. Taking a signal out of its slot resets it.
//!
//! Each tick carries a process-wide sequence number and the follower echoes it
//! in its acknowledgement, so an answer that belongs to an earlier tick is
//! detected and dropped instead of being mistaken for the current one.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// One scheduled shot, as broadcast by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSignal {
    /// Session the shot belongs to.
    pub generation: u64,
    /// Monotonically increasing across the whole process.
    pub seq: u64,
}

/// The follower's answer for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The frame for `seq` is in the frame buffer.
    Captured { seq: u64 },
    /// No frame arrived within the capture window for `seq`.
    Missed { seq: u64 },
    /// Forced by the controller; no frame is coming.
    Released,
}

/// How a driver's wait for acknowledgement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Captured,
    Missed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickSlot {
    Shot(TickSignal),
    Forced,
}

#[derive(Debug, Default)]
struct SyncState {
    recording: bool,
    quit: bool,
    generation: u64,
    tick: Option<TickSlot>,
    done: Option<Ack>,
    fault: Option<String>,
}

impl SyncState {
    fn armed_for(&self, generation: u64) -> bool {
        self.recording && !self.quit && self.generation == generation
    }

    fn force_signals(&mut self) {
        self.tick = Some(TickSlot::Forced);
        self.done = Some(Ack::Released);
    }
}

/// Recording flags and tick/ack signals shared by both loops.
#[derive(Debug, Default)]
pub struct Handshake {
    state: Mutex<SyncState>,
    changed: Condvar,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- controller side ----------------------------------------------

    /// Clear both signals and turn recording on for `generation`.
    pub fn arm(&self, generation: u64) {
        let mut state = self.state.lock();
        state.tick = None;
        state.done = None;
        state.generation = generation;
        state.recording = true;
        self.changed.notify_all();
    }

    /// Turn recording off and force both signals so neither loop stays
    /// blocked inside a tick.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        state.recording = false;
        state.force_signals();
        self.changed.notify_all();
    }

    /// Turn recording off, request quit, and force both signals.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.recording = false;
        state.quit = true;
        state.force_signals();
        self.changed.notify_all();
    }

    /// Record a worker failure and shut both loops down.
    pub fn record_fault(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.fault.get_or_insert_with(|| reason.into());
        state.recording = false;
        state.quit = true;
        state.force_signals();
        self.changed.notify_all();
    }

    pub fn fault(&self) -> Option<String> {
        self.state.lock().fault.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn is_quit(&self) -> bool {
        self.state.lock().quit
    }

    // ---- loop side ------------------------------------------------------

    /// Block until recording is on. Returns the armed generation, or `None`
    /// once quit has been requested.
    pub fn wait_armed(&self) -> Option<u64> {
        let mut state = self.state.lock();
        loop {
            if state.quit {
                return None;
            }
            if state.recording {
                return Some(state.generation);
            }
            self.changed.wait(&mut state);
        }
    }

    /// Whether recording is still on for `generation`.
    pub fn is_armed(&self, generation: u64) -> bool {
        self.state.lock().armed_for(generation)
    }

    /// Sleep until `deadline` unless recording for `generation` stops first.
    /// Returns `true` if the deadline was reached while still armed.
    pub fn sleep_until(&self, generation: u64, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        loop {
            if !state.armed_for(generation) {
                return false;
            }
            if Instant::now() >= deadline {
                return true;
            }
            let _ = self.changed.wait_until(&mut state, deadline);
        }
    }

    /// Publish a tick. Refused (returns `false`) if the tick's session is no
    /// longer armed.
    pub fn broadcast_tick(&self, tick: TickSignal) -> bool {
        let mut state = self.state.lock();
        if !state.armed_for(tick.generation) {
            return false;
        }
        state.tick = Some(TickSlot::Shot(tick));
        self.changed.notify_all();
        true
    }

    /// Block until a tick for `generation` arrives and consume it.
    ///
    /// Returns `None` when the tick signal was forced or recording for
    /// `generation` ended. A tick for a newer session stays in the slot;
    /// ticks for older sessions are dropped.
    pub fn wait_tick(&self, generation: u64) -> Option<TickSignal> {
        let mut state = self.state.lock();
        loop {
            match state.tick.take() {
                Some(TickSlot::Shot(tick)) if tick.generation == generation => return Some(tick),
                Some(TickSlot::Shot(tick)) if tick.generation > generation => {
                    // Belongs to a newer session; leave it for the re-armed waiter.
                    state.tick = Some(TickSlot::Shot(tick));
                    return None;
                }
                Some(TickSlot::Shot(tick)) => {
                    debug!(seq = tick.seq, "dropping tick from an earlier session");
                }
                Some(TickSlot::Forced) => return None,
                None => {}
            }
            if !state.armed_for(generation) {
                return None;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Publish the follower's answer for a tick.
    pub fn acknowledge(&self, ack: Ack) {
        let mut state = self.state.lock();
        state.done = Some(ack);
        self.changed.notify_all();
    }

    /// Block until the follower answers tick `seq`, or the wait is released.
    ///
    /// Answers carrying another sequence number are stale and skipped. There
    /// is no timeout: a wait only ends through an answer or through the
    /// controller forcing the signal (or ending the session).
    pub fn wait_ack(&self, generation: u64, seq: u64) -> AckOutcome {
        let mut state = self.state.lock();
        loop {
            match state.done.take() {
                Some(Ack::Captured { seq: got }) if got == seq => return AckOutcome::Captured,
                Some(Ack::Missed { seq: got }) if got == seq => return AckOutcome::Missed,
                Some(Ack::Released) => return AckOutcome::Released,
                Some(stale) => {
                    warn!(expected = seq, ?stale, "discarding acknowledgement for another tick");
                }
                None => {}
            }
            if !state.armed_for(generation) {
                return AckOutcome::Released;
            }
            self.changed.wait(&mut state);
        }
    }
}
