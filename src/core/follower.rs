//! The camera-facing loop.
//!
//! Waits for each tick, polls the camera until a frame arrives, appends it
//! and acknowledges. Acquisition for one tick is bounded by the capture
//! window and re-checks the recording state between polls, so a stop or quit
//! is noticed within one poll slice.

use crate::core::buffer::SessionBuffers;
use crate::core::handshake::{Ack, Handshake, TickSignal};
use crate::device::{to_canonical_color, FrameSource};
use crate::stats::SharedRecorderStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Result of trying to capture the frame for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Frame appended and acknowledged.
    Stored,
    /// Capture window ran out; acknowledged as missed.
    Missed,
    /// Recording stopped mid-acquisition; nothing acknowledged.
    Abandoned,
}

/// Owns the camera.
pub struct CaptureFollower<C> {
    camera: C,
    handshake: Arc<Handshake>,
    buffers: Arc<SessionBuffers>,
    stats: SharedRecorderStats,
    poll: Duration,
    window: Duration,
}

impl<C: FrameSource> CaptureFollower<C> {
    pub fn new(
        camera: C,
        poll: Duration,
        window: Duration,
        handshake: Arc<Handshake>,
        buffers: Arc<SessionBuffers>,
        stats: SharedRecorderStats,
    ) -> Self {
        Self {
            camera,
            handshake,
            buffers,
            stats,
            poll,
            window,
        }
    }

    /// Run until quit is requested.
    pub fn run(mut self) {
        while let Some(generation) = self.handshake.wait_armed() {
            debug!(generation, "capture follower armed");
            while let Some(tick) = self.handshake.wait_tick(generation) {
                self.capture(tick);
            }
        }
        debug!("capture follower exiting");
    }

    /// Acquire, store and acknowledge the frame for `tick`.
    pub fn capture(&mut self, tick: TickSignal) -> Capture {
        let started = Instant::now();

        loop {
            if !self.handshake.is_armed(tick.generation) {
                self.stats.record_abandoned_tick();
                debug!(seq = tick.seq, "recording stopped during capture");
                return Capture::Abandoned;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.window {
                warn!(
                    seq = tick.seq,
                    waited_ms = elapsed.as_millis() as u64,
                    "camera produced no frame for tick"
                );
                self.handshake.acknowledge(Ack::Missed { seq: tick.seq });
                return Capture::Missed;
            }

            let slice = self.poll.min(self.window - elapsed);
            let Some(raw) = self.camera.try_get_frame(slice) else {
                continue;
            };

            let frame = to_canonical_color(raw);
            if !self.buffers.push_frame(tick.generation, frame) {
                self.stats.record_abandoned_tick();
                debug!(seq = tick.seq, "session closed before frame was stored");
                return Capture::Abandoned;
            }

            self.stats.record_frame_captured();
            trace!(seq = tick.seq, "frame stored");
            self.handshake.acknowledge(Ack::Captured { seq: tick.seq });
            return Capture::Stored;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SessionId;
    use crate::device::SimulatedCamera;
    use crate::stats::create_shared_stats;

    fn follower(camera: SimulatedCamera) -> (CaptureFollower<SimulatedCamera>, Arc<Handshake>, Arc<SessionBuffers>) {
        let handshake = Arc::new(Handshake::new());
        let buffers = Arc::new(SessionBuffers::new());
        let f = CaptureFollower::new(
            camera,
            Duration::from_millis(10),
            Duration::from_millis(60),
            handshake.clone(),
            buffers.clone(),
            create_shared_stats(),
        );
        (f, handshake, buffers)
    }

    #[test]
    fn test_stored_frame_is_acknowledged() {
        let (mut f, hs, buffers) = follower(SimulatedCamera::new(2, 2));
        buffers.begin(1, SessionId(0));
        hs.arm(1);

        let tick = TickSignal { generation: 1, seq: 9 };
        assert_eq!(f.capture(tick), Capture::Stored);
        assert_eq!(buffers.lengths(), (0, 1));
        assert_eq!(
            hs.wait_ack(1, 9),
            crate::core::handshake::AckOutcome::Captured
        );
    }

    #[test]
    fn test_window_exhaustion_is_missed() {
        let (mut f, hs, buffers) = follower(SimulatedCamera::new(2, 2).offline());
        buffers.begin(1, SessionId(0));
        hs.arm(1);

        let started = Instant::now();
        let tick = TickSignal { generation: 1, seq: 1 };
        assert_eq!(f.capture(tick), Capture::Missed);
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(buffers.lengths(), (0, 0));
        assert_eq!(hs.wait_ack(1, 1), crate::core::handshake::AckOutcome::Missed);
    }

    #[test]
    fn test_disarmed_capture_is_abandoned() {
        let (mut f, hs, buffers) = follower(SimulatedCamera::new(2, 2));
        buffers.begin(1, SessionId(0));
        hs.arm(1);
        hs.disarm();

        let tick = TickSignal { generation: 1, seq: 1 };
        assert_eq!(f.capture(tick), Capture::Abandoned);
        assert_eq!(buffers.lengths(), (0, 0));
    }
}
