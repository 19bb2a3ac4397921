//! Demo Recorder - synchronized arm-state and camera recording for robot
//! demonstrations.
//!
//! Two worker loops run side by side. The sampling driver owns a drift-free
//! fixed-rate schedule and takes one arm state per tick; the capture follower
//! waits for each tick and grabs the matching camera frame. The driver does
//! not advance until the follower has answered for the same tick, so every
//! saved session holds exactly one frame per state sample.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Demo Recorder                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │   b / n / m / q                                               │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  ┌────────────┐  arm/disarm   ┌───────────┐  tick  ┌────────┐ │
//! │  │  Session   │──────────────▶│ Sampling  │───────▶│Capture │ │
//! │  │ Controller │               │  Driver   │◀───────│Follower│ │
//! │  └────────────┘               └───────────┘  ack   └────────┘ │
//! │        │ take                      │ state            │ frame │
//! │        ▼                           ▼                  ▼       │
//! │  ┌────────────┐              ┌──────────────────────────┐     │
//! │  │ Trajectory │◀─────────────│     Session Buffers      │     │
//! │  │    Set     │   finalize   └──────────────────────────┘     │
//! │  └────────────┘                                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use demo_recorder::{create_shared_stats, Config, SessionController};
//! use demo_recorder::device::{SimulatedArm, SimulatedCamera};
//! use std::time::Duration;
//!
//! let config = Config::default();
//! let camera = SimulatedCamera::new(config.camera.width, config.camera.height);
//! let mut recorder =
//!     SessionController::spawn(&config, SimulatedArm::new(), camera, create_shared_stats())?;
//!
//! recorder.start()?;
//! std::thread::sleep(Duration::from_secs(1));
//! recorder.save();
//!
//! let summary = recorder.quit();
//! println!("saved {} demos", summary.saved_count());
//! # Ok::<(), demo_recorder::RecorderError>(())
//! ```

pub mod config;
pub mod core;
pub mod dataset;
pub mod device;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{CameraConfig, Config, ConfigError};
pub use crate::core::{
    RecorderError, RecorderEvent, RecordingSummary, SessionCommand, SessionController,
    TickScheduler,
};
pub use dataset::{
    load_dataset, DatasetError, DatasetMetadata, DatasetWriter, Demo, JsonDatasetWriter,
    SessionId, TrajectorySet,
};
pub use device::{ArmSensor, FrameSource, SensorError};
pub use stats::{create_shared_stats, RecorderStats, SharedRecorderStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Key bindings shown to the operator.
pub const HOTKEYS: &str = r#"
╔══════════════════════════════════════════════╗
║              DEMO RECORDER KEYS              ║
╠══════════════════════════════════════════════╣
║                                              ║
║   b  Start Record                            ║
║   n  Save Trajectory                         ║
║   m  Reject Trajectory                       ║
║   q  Quit System                             ║
║                                              ║
║  Type a key and press Enter. Starting while  ║
║  recording throws the current take away.     ║
║                                              ║
╚══════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotkeys_match_commands() {
        for (key, command) in [
            ("b", SessionCommand::Start),
            ("n", SessionCommand::Save),
            ("m", SessionCommand::Reject),
            ("q", SessionCommand::Quit),
        ] {
            assert!(HOTKEYS.contains(&format!("   {key}  ")));
            assert_eq!(SessionCommand::parse(key), Ok(command));
        }
    }

    #[test]
    fn test_hotkeys_banner_is_rectangular() {
        let widths: Vec<usize> = HOTKEYS
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.chars().count())
            .collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{widths:?}");
    }
}
