//! Interfaces to the arm and camera drivers.
//!
//! The hardware drivers themselves live outside this crate. The recorder only
//! needs a way to take one state reading and a way to poll for the next color
//! frame; [`sim`] provides stand-ins used by the binary and the tests.

pub mod sim;
pub mod types;

use std::time::Duration;
use thiserror::Error;

// Re-export commonly used types
pub use sim::{SimulatedArm, SimulatedCamera};
pub use types::{to_canonical_color, Frame, PixelFormat, RawFrame, StateSample, STATE_DIM};

/// A source of instantaneous arm state readings.
///
/// Implementations either return a reading or fail; the sampling driver does
/// not retry, so a failure ends recording.
pub trait ArmSensor: Send {
    fn sample_state(&mut self) -> Result<StateSample, SensorError>;
}

/// A camera that can be polled for its next color frame.
pub trait FrameSource: Send {
    /// Wait up to `timeout` for a frame. `None` means no frame yet; retry.
    fn try_get_frame(&mut self, timeout: Duration) -> Option<RawFrame>;
}

impl<T: ArmSensor + ?Sized> ArmSensor for Box<T> {
    fn sample_state(&mut self) -> Result<StateSample, SensorError> {
        (**self).sample_state()
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn try_get_frame(&mut self, timeout: Duration) -> Option<RawFrame> {
        (**self).try_get_frame(timeout)
    }
}

/// Errors raised by a sensor driver.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    #[error("arm disconnected: {0}")]
    Disconnected(String),
    #[error("arm read failed: {0}")]
    ReadFailed(String),
}
