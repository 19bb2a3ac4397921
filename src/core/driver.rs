//! The arm-facing fixed-rate loop.
//!
//! Per tick: reach the deadline, broadcast the tick, take one state sample,
//! append it, then block until the capture follower answers for that same
//! tick. Only then does the schedule advance.

use crate::core::buffer::SessionBuffers;
use crate::core::clock::{TickScheduler, TickWait};
use crate::core::error::RecorderError;
use crate::core::handshake::{AckOutcome, Handshake, TickSignal};
use crate::device::ArmSensor;
use crate::stats::SharedRecorderStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Owns the tick schedule and the arm.
pub struct SamplingDriver<A> {
    arm: A,
    scheduler: TickScheduler,
    handshake: Arc<Handshake>,
    buffers: Arc<SessionBuffers>,
    stats: SharedRecorderStats,
    last_seq: u64,
}

impl<A: ArmSensor> SamplingDriver<A> {
    pub fn new(
        arm: A,
        period: Duration,
        handshake: Arc<Handshake>,
        buffers: Arc<SessionBuffers>,
        stats: SharedRecorderStats,
    ) -> Self {
        Self {
            arm,
            scheduler: TickScheduler::new(period),
            handshake,
            buffers,
            stats,
            last_seq: 0,
        }
    }

    /// Run until quit is requested.
    ///
    /// A sensor failure ends the loop with an error; the caller is
    /// responsible for running the shutdown handshake so the follower is
    /// released.
    pub fn run(mut self) -> Result<(), RecorderError> {
        while let Some(generation) = self.handshake.wait_armed() {
            debug!(generation, "sampling driver armed");
            self.record(generation)?;
        }
        debug!("sampling driver exiting");
        Ok(())
    }

    fn record(&mut self, generation: u64) -> Result<(), RecorderError> {
        self.scheduler.reset();

        while self.handshake.is_armed(generation) {
            match self.scheduler.poll(Instant::now()) {
                TickWait::Sleep { deadline } => {
                    if !self.handshake.sleep_until(generation, deadline) {
                        break;
                    }
                }
                TickWait::Due { .. } => {}
                TickWait::Overrun { late_by, .. } => {
                    self.stats.record_overrun();
                    warn!(
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "tick deadline already passed; dispatching without sleep"
                    );
                }
            }

            self.dispatch(generation)?;
            self.scheduler.advance();
        }

        // Pausing drops the phase; the next session starts a fresh schedule.
        self.scheduler.reset();
        Ok(())
    }

    fn dispatch(&mut self, generation: u64) -> Result<(), RecorderError> {
        self.last_seq += 1;
        let tick = TickSignal {
            generation,
            seq: self.last_seq,
        };

        if !self.handshake.broadcast_tick(tick) {
            return Ok(());
        }
        let dispatched = Instant::now();
        self.stats.record_tick_dispatched();

        let sample = self.arm.sample_state()?;
        let appended = self.buffers.push_state(generation, sample);

        match self.handshake.wait_ack(generation, tick.seq) {
            AckOutcome::Captured => {
                self.stats.record_ack_latency(dispatched.elapsed());
                trace!(seq = tick.seq, "tick complete");
            }
            AckOutcome::Missed => {
                if appended {
                    self.buffers.retract_state(generation);
                }
                self.stats.record_missed_tick();
                warn!(seq = tick.seq, "no frame within capture window; tick dropped");
            }
            AckOutcome::Released => {
                debug!(seq = tick.seq, "driver released before tick completed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handshake::Ack;
    use crate::dataset::SessionId;
    use crate::device::{to_canonical_color, PixelFormat, RawFrame, SimulatedArm};
    use crate::stats::create_shared_stats;
    use std::thread;

    type Fixture = (SamplingDriver<SimulatedArm>, Arc<Handshake>, Arc<SessionBuffers>);

    fn driver(arm: SimulatedArm) -> Fixture {
        let handshake = Arc::new(Handshake::new());
        let buffers = Arc::new(SessionBuffers::new());
        let d = SamplingDriver::new(
            arm,
            Duration::from_millis(50),
            handshake.clone(),
            buffers.clone(),
            create_shared_stats(),
        );
        buffers.begin(1, SessionId(0));
        handshake.arm(1);
        (d, handshake, buffers)
    }

    /// Answer the next tick of session 1 with whatever `answer` returns.
    fn answer_next_tick(
        handshake: &Arc<Handshake>,
        answer: impl FnOnce(TickSignal) -> Ack + Send + 'static,
    ) -> thread::JoinHandle<Option<TickSignal>> {
        let handshake = handshake.clone();
        thread::spawn(move || {
            let tick = handshake.wait_tick(1)?;
            handshake.acknowledge(answer(tick));
            Some(tick)
        })
    }

    #[test]
    fn test_missed_tick_retracts_state() {
        let (mut d, hs, buffers) = driver(SimulatedArm::new());
        let follower = answer_next_tick(&hs, |tick| Ack::Missed { seq: tick.seq });

        d.dispatch(1).unwrap();
        follower.join().unwrap();

        assert_eq!(buffers.lengths(), (0, 0));
        let snap = d.stats.stats();
        assert_eq!(snap.missed_ticks, 1);
        assert_eq!(snap.ticks_dispatched, 1);
        assert!(snap.ack_latency.is_none());
    }

    #[test]
    fn test_captured_tick_keeps_pair() {
        let (mut d, hs, buffers) = driver(SimulatedArm::new());
        let frames = buffers.clone();
        let follower = answer_next_tick(&hs, move |tick| {
            frames.push_frame(
                tick.generation,
                to_canonical_color(RawFrame {
                    width: 1,
                    height: 1,
                    format: PixelFormat::Rgb8,
                    data: vec![1, 2, 3],
                }),
            );
            Ack::Captured { seq: tick.seq }
        });

        d.dispatch(1).unwrap();
        follower.join().unwrap();

        assert_eq!(buffers.lengths(), (1, 1));
        assert_eq!(d.stats.stats().missed_ticks, 0);
        assert_eq!(d.stats.ack_latency().map(|l| l.samples), Some(1));
    }

    #[test]
    fn test_sequence_numbers_increase_per_tick() {
        let (mut d, hs, _buffers) = driver(SimulatedArm::new());
        for expected in 1..=3 {
            let follower = answer_next_tick(&hs, |tick| Ack::Missed { seq: tick.seq });
            d.dispatch(1).unwrap();
            let tick = follower.join().unwrap().unwrap();
            assert_eq!(tick.seq, expected);
        }
    }

    #[test]
    fn test_disarmed_session_takes_no_sample() {
        let (mut d, hs, buffers) = driver(SimulatedArm::new());
        hs.disarm();

        d.dispatch(1).unwrap();
        assert_eq!(d.arm.samples_taken(), 0);
        assert_eq!(buffers.lengths(), (0, 0));
        assert_eq!(d.stats.stats().ticks_dispatched, 0);
    }

    #[test]
    fn test_sensor_failure_is_returned() {
        let (mut d, _hs, buffers) = driver(SimulatedArm::new().failing_after(0));

        let err = d.dispatch(1).unwrap_err();
        assert!(matches!(err, RecorderError::Sensor(_)));
        assert_eq!(buffers.lengths(), (0, 0));
    }
}
