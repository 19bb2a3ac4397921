//! The synchronized sampling engine.
//!
//! This module contains:
//! - The drift-free tick schedule
//! - The tick/ack handshake shared by both loops
//! - Generation-tagged session buffers
//! - The sampling driver and the capture follower
//! - The session lifecycle controller

pub mod buffer;
pub mod clock;
pub mod driver;
pub mod error;
pub mod follower;
pub mod handshake;
pub mod session;

// Re-export commonly used types
pub use buffer::{ClosedSession, SessionBuffer, SessionBuffers, Trim};
pub use clock::{TickScheduler, TickWait};
pub use driver::SamplingDriver;
pub use error::{RecorderError, RecorderEvent};
pub use follower::{Capture, CaptureFollower};
pub use handshake::{Ack, AckOutcome, Handshake, TickSignal};
pub use session::{
    RecordingSummary, RejectedSession, SavedSession, SessionCommand, SessionController,
    StartedSession, UnknownCommand, USAGE,
};
