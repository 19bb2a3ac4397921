//! Append-only session buffers shared by the two sampling loops.
//!
//! The active session (its generation and identifier) and both buffers sit
//! behind one mutex. Every append names the generation it was produced for
//! and is refused unless that generation is still the active one, so a tick
//! that straddles a save or reject cannot leak into the next session.

use crate::dataset::{Demo, SessionId};
use crate::device::{Frame, StateSample};
use parking_lot::Mutex;

/// States and frames recorded for one session.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    pub states: Vec<StateSample>,
    pub frames: Vec<Frame>,
}

/// Record of a tail trim performed when finalizing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trim {
    pub states: usize,
    pub frames: usize,
    pub kept: usize,
}

impl SessionBuffer {
    pub fn is_aligned(&self) -> bool {
        self.states.len() == self.frames.len()
    }

    /// Truncate both sequences to the shorter length. Never pads.
    pub fn align(&mut self) -> Option<Trim> {
        if self.is_aligned() {
            return None;
        }
        let trim = Trim {
            states: self.states.len(),
            frames: self.frames.len(),
            kept: self.states.len().min(self.frames.len()),
        };
        self.states.truncate(trim.kept);
        self.frames.truncate(trim.kept);
        Some(trim)
    }

    /// Align and convert into a finished demo.
    pub fn finalize(mut self) -> (Demo, Option<Trim>) {
        let trim = self.align();
        (Demo::from_aligned(self.states, self.frames), trim)
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveSession {
    generation: u64,
    id: SessionId,
}

#[derive(Debug, Default)]
struct Inner {
    active: Option<ActiveSession>,
    buffer: SessionBuffer,
}

/// What was in the buffers when a session was closed.
#[derive(Debug)]
pub struct ClosedSession {
    pub id: SessionId,
    pub buffer: SessionBuffer,
}

/// Mutex-protected buffers for the session currently recording.
#[derive(Debug, Default)]
pub struct SessionBuffers {
    inner: Mutex<Inner>,
}

impl SessionBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, clearing anything left in the buffers. Returns the
    /// number of state samples thrown away.
    pub fn begin(&self, generation: u64, id: SessionId) -> usize {
        let mut inner = self.inner.lock();
        let discarded = inner.buffer.states.len();
        inner.buffer.states.clear();
        inner.buffer.frames.clear();
        inner.active = Some(ActiveSession { generation, id });
        discarded
    }

    pub fn push_state(&self, generation: u64, sample: StateSample) -> bool {
        let mut inner = self.inner.lock();
        if !inner.accepts(generation) {
            return false;
        }
        inner.buffer.states.push(sample);
        true
    }

    pub fn push_frame(&self, generation: u64, frame: Frame) -> bool {
        let mut inner = self.inner.lock();
        if !inner.accepts(generation) {
            return false;
        }
        inner.buffer.frames.push(frame);
        true
    }

    /// Drop the newest state sample when it has no matching frame.
    pub fn retract_state(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if !inner.accepts(generation) || inner.buffer.states.len() <= inner.buffer.frames.len() {
            return false;
        }
        inner.buffer.states.pop();
        true
    }

    /// Close the active session and take its buffers, leaving empty ones.
    pub fn take(&self) -> Option<ClosedSession> {
        let mut inner = self.inner.lock();
        let active = inner.active.take()?;
        Some(ClosedSession {
            id: active.id,
            buffer: std::mem::take(&mut inner.buffer),
        })
    }

    /// Lengths of the (states, frames) buffers.
    pub fn lengths(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.buffer.states.len(), inner.buffer.frames.len())
    }

    pub fn active(&self) -> Option<SessionId> {
        self.inner.lock().active.map(|a| a.id)
    }
}

impl Inner {
    fn accepts(&self, generation: u64) -> bool {
        self.active.is_some_and(|a| a.generation == generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{to_canonical_color, PixelFormat, RawFrame, STATE_DIM};

    fn frame() -> Frame {
        to_canonical_color(RawFrame {
            width: 1,
            height: 1,
            format: PixelFormat::Rgb8,
            data: vec![0, 0, 0],
        })
    }

    fn state(v: f64) -> StateSample {
        StateSample::new([v; STATE_DIM])
    }

    #[test]
    fn test_appends_require_active_generation() {
        let buffers = SessionBuffers::new();
        assert!(!buffers.push_state(1, state(0.0)));

        buffers.begin(1, SessionId(0));
        assert!(buffers.push_state(1, state(0.0)));
        assert!(buffers.push_frame(1, frame()));
        assert!(!buffers.push_state(2, state(1.0)));
        assert_eq!(buffers.lengths(), (1, 1));
    }

    #[test]
    fn test_take_leaves_empty_buffers() {
        let buffers = SessionBuffers::new();
        buffers.begin(1, SessionId(4));
        buffers.push_state(1, state(0.0));
        buffers.push_frame(1, frame());

        let closed = buffers.take().unwrap();
        assert_eq!(closed.id, SessionId(4));
        assert_eq!(closed.buffer.states.len(), 1);
        assert_eq!(buffers.lengths(), (0, 0));
        assert!(buffers.take().is_none());

        // A late append for the closed session is refused.
        assert!(!buffers.push_frame(1, frame()));
    }

    #[test]
    fn test_begin_discards_previous_contents() {
        let buffers = SessionBuffers::new();
        buffers.begin(1, SessionId(0));
        buffers.push_state(1, state(0.0));
        buffers.push_state(1, state(0.0));
        assert_eq!(buffers.begin(2, SessionId(0)), 2);
        assert_eq!(buffers.lengths(), (0, 0));
    }

    #[test]
    fn test_retract_only_unmatched_state() {
        let buffers = SessionBuffers::new();
        buffers.begin(1, SessionId(0));
        buffers.push_state(1, state(0.0));
        buffers.push_frame(1, frame());
        assert!(!buffers.retract_state(1));

        buffers.push_state(1, state(1.0));
        assert!(buffers.retract_state(1));
        assert_eq!(buffers.lengths(), (1, 1));
    }

    #[test]
    fn test_finalize_trims_to_shorter() {
        let buffer = SessionBuffer {
            states: vec![state(0.0), state(1.0), state(2.0)],
            frames: vec![frame(), frame()],
        };
        let (demo, trim) = buffer.finalize();
        assert_eq!(demo.len(), 2);
        assert_eq!(
            trim,
            Some(Trim {
                states: 3,
                frames: 2,
                kept: 2
            })
        );
        assert_eq!(demo.states()[1], state(1.0));
    }

    #[test]
    fn test_finalize_aligned_needs_no_trim() {
        let buffer = SessionBuffer {
            states: vec![state(0.0)],
            frames: vec![frame()],
        };
        let (demo, trim) = buffer.finalize();
        assert_eq!(demo.len(), 1);
        assert!(trim.is_none());
    }
}
