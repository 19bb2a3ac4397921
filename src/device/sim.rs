//! Simulated arm and camera.
//!
//! These stand in for the hardware drivers so the recorder can run (and be
//! tested) without a robot attached. Timing behaviour is real: the camera
//! sleeps for its configured latency, so the sampling loops see the same
//! waits they would see against hardware.

use crate::device::types::{PixelFormat, RawFrame, StateSample, STATE_DIM};
use crate::device::{ArmSensor, FrameSource, SensorError};
use std::thread;
use std::time::{Duration, Instant};

/// A synthetic arm whose pose follows slow sinusoids.
pub struct SimulatedArm {
    origin: Instant,
    samples: u64,
    fail_after: Option<u64>,
}

impl SimulatedArm {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            samples: 0,
            fail_after: None,
        }
    }

    /// Fail every read after `count` successful samples.
    pub fn failing_after(mut self, count: u64) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Number of successful readings so far.
    pub fn samples_taken(&self) -> u64 {
        self.samples
    }
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmSensor for SimulatedArm {
    fn sample_state(&mut self) -> Result<StateSample, SensorError> {
        if let Some(limit) = self.fail_after {
            if self.samples >= limit {
                return Err(SensorError::Disconnected(format!(
                    "simulated fault after {limit} samples"
                )));
            }
        }

        let t = self.origin.elapsed().as_secs_f64();
        let mut values = [0.0; STATE_DIM];
        for (i, v) in values.iter_mut().enumerate().take(STATE_DIM - 1) {
            let phase = i as f64 * 0.7;
            *v = 0.25 * (t * 0.5 + phase).sin();
        }
        values[STATE_DIM - 1] = 0.04 + 0.04 * (t * 0.3).sin();

        self.samples += 1;
        Ok(StateSample::new(values))
    }
}

/// A synthetic camera emitting BGR gradient frames after a fixed latency.
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    latency: Duration,
    offline: bool,
    pending_since: Option<Instant>,
    frames_served: u64,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            latency: Duration::ZERO,
            offline: false,
            pending_since: None,
            frames_served: 0,
        }
    }

    /// Time from the first poll of a frame until it becomes available.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// A camera that never produces a frame.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }

    fn render(&self) -> RawFrame {
        let shade = (self.frames_served % 256) as u8;
        let mut data = Vec::with_capacity(RawFrame::expected_len(self.width, self.height));
        for y in 0..self.height {
            for x in 0..self.width {
                let b = (x % 256) as u8;
                let g = (y % 256) as u8;
                data.extend_from_slice(&[b, g, shade]);
            }
        }
        RawFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Bgr8,
            data,
        }
    }
}

impl FrameSource for SimulatedCamera {
    fn try_get_frame(&mut self, timeout: Duration) -> Option<RawFrame> {
        if self.offline {
            thread::sleep(timeout);
            return None;
        }

        let requested = *self.pending_since.get_or_insert_with(Instant::now);
        let ready_at = requested + self.latency;
        let now = Instant::now();
        if now < ready_at {
            let wait = ready_at - now;
            if wait > timeout {
                thread::sleep(timeout);
                return None;
            }
            thread::sleep(wait);
        }

        self.pending_since = None;
        let frame = self.render();
        self.frames_served += 1;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_fails_after_limit() {
        let mut arm = SimulatedArm::new().failing_after(2);
        assert!(arm.sample_state().is_ok());
        assert!(arm.sample_state().is_ok());
        assert!(matches!(
            arm.sample_state(),
            Err(SensorError::Disconnected(_))
        ));
        assert_eq!(arm.samples_taken(), 2);
    }

    #[test]
    fn test_camera_latency_spans_polls() {
        let mut camera = SimulatedCamera::new(4, 2).with_latency(Duration::from_millis(30));
        assert!(camera.try_get_frame(Duration::from_millis(10)).is_none());
        let frame = camera
            .try_get_frame(Duration::from_millis(100))
            .expect("frame after latency");
        assert_eq!(frame.format, PixelFormat::Bgr8);
        assert_eq!(frame.data.len(), RawFrame::expected_len(4, 2));
        assert_eq!(camera.frames_served(), 1);
    }

    #[test]
    fn test_offline_camera_never_yields() {
        let mut camera = SimulatedCamera::new(2, 2).offline();
        assert!(camera.try_get_frame(Duration::from_millis(5)).is_none());
        assert_eq!(camera.frames_served(), 0);
    }
}
