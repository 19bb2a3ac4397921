//! Drift-free tick scheduling.
//!
//! Deadlines accumulate as `next += period` from the first deadline, never
//! from the time the sampling thread actually woke. A late wake is reported
//! as an overrun and the schedule is left alone, so jitter never accumulates
//! into drift.

use std::time::{Duration, Instant};

/// What the driver should do to reach the current deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickWait {
    /// The deadline is still ahead; sleep until it.
    Sleep { deadline: Instant },
    /// The deadline is exactly now.
    Due { deadline: Instant },
    /// The deadline already passed before the driver got here. Proceed
    /// without sleeping; the schedule is not resynchronized.
    Overrun { deadline: Instant, late_by: Duration },
}

impl TickWait {
    pub fn deadline(&self) -> Instant {
        match *self {
            TickWait::Sleep { deadline }
            | TickWait::Due { deadline }
            | TickWait::Overrun { deadline, .. } => deadline,
        }
    }
}

/// Fixed-rate deadline generator on a monotonic clock.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    period: Duration,
    next: Option<Instant>,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: None,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The pending deadline, if the schedule is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Ticks completed since the schedule was last armed.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Classify `now` against the pending deadline.
    ///
    /// The first call after [`reset`](Self::reset) arms the schedule with
    /// `now + period`, so no tick fires at the moment recording starts.
    pub fn poll(&mut self, now: Instant) -> TickWait {
        let deadline = *self.next.get_or_insert(now + self.period);
        if now < deadline {
            TickWait::Sleep { deadline }
        } else if now == deadline {
            TickWait::Due { deadline }
        } else {
            TickWait::Overrun {
                deadline,
                late_by: now - deadline,
            }
        }
    }

    /// Move to the next deadline, one period after the previous one.
    pub fn advance(&mut self) -> Option<Instant> {
        let next = self.next? + self.period;
        self.next = Some(next);
        self.ticks += 1;
        Some(next)
    }

    /// Discard the phase entirely; the next poll starts a fresh schedule.
    pub fn reset(&mut self) {
        self.next = None;
        self.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Duration = Duration::from_millis(200);

    #[test]
    fn test_first_deadline_is_one_period_out() {
        let mut sched = TickScheduler::new(P);
        let t0 = Instant::now();
        assert_eq!(sched.poll(t0), TickWait::Sleep { deadline: t0 + P });
        assert_eq!(sched.deadline(), Some(t0 + P));
    }

    #[test]
    fn test_deadlines_ignore_wake_jitter() {
        let mut sched = TickScheduler::new(P);
        let t0 = Instant::now();
        let first = sched.poll(t0).deadline();

        // Wake late by varying amounts; deadlines still step by exactly P.
        let jitter = [3u64, 17, 0, 41, 9];
        let mut previous = first;
        for (i, ms) in jitter.iter().enumerate() {
            let woke = previous + Duration::from_millis(*ms);
            let wait = sched.poll(woke);
            assert_eq!(wait.deadline(), previous);
            let next = sched.advance().unwrap();
            assert_eq!(next, previous + P, "tick {i}");
            previous = next;
        }
        assert_eq!(previous, first + P * jitter.len() as u32);
        assert_eq!(sched.ticks(), jitter.len() as u64);
    }

    #[test]
    fn test_overrun_does_not_resync() {
        let mut sched = TickScheduler::new(P);
        let t0 = Instant::now();
        let deadline = sched.poll(t0).deadline();

        let late = deadline + Duration::from_millis(350);
        match sched.poll(late) {
            TickWait::Overrun { deadline: d, late_by } => {
                assert_eq!(d, deadline);
                assert_eq!(late_by, Duration::from_millis(350));
            }
            other => panic!("expected overrun, got {other:?}"),
        }

        // Next deadline is anchored to the schedule, which is still behind `late`.
        let next = sched.advance().unwrap();
        assert_eq!(next, deadline + P);
        assert!(matches!(sched.poll(late), TickWait::Overrun { .. }));
    }

    #[test]
    fn test_exact_deadline_is_due() {
        let mut sched = TickScheduler::new(P);
        let t0 = Instant::now();
        let deadline = sched.poll(t0).deadline();
        assert_eq!(sched.poll(deadline), TickWait::Due { deadline });
    }

    #[test]
    fn test_reset_discards_phase() {
        let mut sched = TickScheduler::new(P);
        let t0 = Instant::now();
        sched.poll(t0);
        sched.advance();
        sched.reset();
        assert_eq!(sched.deadline(), None);
        assert_eq!(sched.advance(), None);

        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(sched.poll(t1).deadline(), t1 + P);
        assert_eq!(sched.ticks(), 0);
    }
}
