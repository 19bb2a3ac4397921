//! Session lifecycle: start, save, reject and quit.
//!
//! The controller owns both worker threads and the map of saved demos. Commands
//! are processed one at a time on the caller's thread and never wait on a tick
//! boundary: stopping a session clears the recording flag and forces both
//! signals, then swaps the buffers out under their mutex.

use crate::config::Config;
use crate::core::buffer::{SessionBuffers, Trim};
use crate::core::driver::SamplingDriver;
use crate::core::error::{RecorderError, RecorderEvent};
use crate::core::follower::CaptureFollower;
use crate::core::handshake::Handshake;
use crate::dataset::{DatasetMetadata, Demo, SessionId, TrajectorySet};
use crate::device::{ArmSensor, FrameSource};
use crate::stats::SharedRecorderStats;
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{error, info, warn};

pub const DRIVER_THREAD: &str = "sampling-driver";
pub const FOLLOWER_THREAD: &str = "capture-follower";

/// Shown for any input that is not a command.
pub const USAGE: &str = "Use: b / n / m / q";

/// One operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Save,
    Reject,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command {input:?}. {}", USAGE)]
pub struct UnknownCommand {
    pub input: String,
}

impl SessionCommand {
    /// Map a line of operator input to a command. Surrounding whitespace and
    /// case are ignored.
    pub fn parse(input: &str) -> Result<Self, UnknownCommand> {
        match input.trim().to_ascii_lowercase().as_str() {
            "b" => Ok(SessionCommand::Start),
            "n" => Ok(SessionCommand::Save),
            "m" => Ok(SessionCommand::Reject),
            "q" => Ok(SessionCommand::Quit),
            _ => Err(UnknownCommand {
                input: input.trim().to_string(),
            }),
        }
    }
}

impl FromStr for SessionCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Outcome of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedSession {
    pub id: SessionId,
    /// A session was already recording and has been thrown away.
    pub restarted: bool,
    /// State samples thrown away by the restart.
    pub discarded: usize,
}

/// Outcome of `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedSession {
    pub id: SessionId,
    pub steps: usize,
    pub trim: Option<Trim>,
}

/// Outcome of `reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedSession {
    pub id: SessionId,
    pub states: usize,
    pub frames: usize,
}

/// What a finished run leaves behind.
#[derive(Debug)]
pub struct RecordingSummary {
    pub demos: BTreeMap<SessionId, Demo>,
    /// Why the workers stopped early, if they did.
    pub fault: Option<String>,
}

impl RecordingSummary {
    pub fn saved_count(&self) -> usize {
        self.demos.len()
    }

    pub fn into_trajectory_set(
        self,
        instruction: impl Into<String>,
        metadata: DatasetMetadata,
    ) -> TrajectorySet {
        TrajectorySet::new(instruction, metadata, self.demos)
    }
}

/// Reports a worker's end to the rest of the recorder.
///
/// Dropping the guard always runs the shutdown handshake, so the other loop
/// is released however its peer exits, including by panic.
struct WorkerGuard {
    worker: &'static str,
    handshake: Arc<Handshake>,
    events: Sender<RecorderEvent>,
}

impl WorkerGuard {
    fn fault(&self, reason: String) {
        error!(worker = self.worker, %reason, "worker stopped");
        self.handshake.record_fault(format!("{}: {reason}", self.worker));
        let _ = self.events.send(RecorderEvent::WorkerFault {
            worker: self.worker,
            reason,
        });
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.fault("panicked".to_string());
        }
        self.handshake.shutdown();
    }
}

/// Drives recording sessions over one pair of worker threads.
pub struct SessionController {
    handshake: Arc<Handshake>,
    buffers: Arc<SessionBuffers>,
    stats: SharedRecorderStats,
    driver: Option<JoinHandle<()>>,
    follower: Option<JoinHandle<()>>,
    events: Receiver<RecorderEvent>,
    next_id: SessionId,
    generation: u64,
    recording: Option<SessionId>,
    demos: BTreeMap<SessionId, Demo>,
}

impl SessionController {
    /// Validate `config` and start both worker loops, idle.
    pub fn spawn<A, C>(
        config: &Config,
        arm: A,
        camera: C,
        stats: SharedRecorderStats,
    ) -> Result<Self, RecorderError>
    where
        A: ArmSensor + 'static,
        C: FrameSource + 'static,
    {
        config.validate()?;

        let handshake = Arc::new(Handshake::new());
        let buffers = Arc::new(SessionBuffers::new());
        let (event_tx, events) = crossbeam_channel::unbounded();

        let driver = SamplingDriver::new(
            arm,
            config.period,
            handshake.clone(),
            buffers.clone(),
            stats.clone(),
        );
        let guard = WorkerGuard {
            worker: DRIVER_THREAD,
            handshake: handshake.clone(),
            events: event_tx.clone(),
        };
        let driver = thread::Builder::new()
            .name(DRIVER_THREAD.to_string())
            .spawn(move || {
                if let Err(e) = driver.run() {
                    guard.fault(e.to_string());
                }
            })
            .map_err(|source| RecorderError::Spawn {
                worker: DRIVER_THREAD,
                source,
            })?;

        let follower = CaptureFollower::new(
            camera,
            config.capture_poll,
            config.capture_timeout,
            handshake.clone(),
            buffers.clone(),
            stats.clone(),
        );
        let guard = WorkerGuard {
            worker: FOLLOWER_THREAD,
            handshake: handshake.clone(),
            events: event_tx,
        };
        let follower = match thread::Builder::new()
            .name(FOLLOWER_THREAD.to_string())
            .spawn(move || {
                let _guard = guard;
                follower.run();
            }) {
            Ok(handle) => handle,
            Err(source) => {
                handshake.shutdown();
                let _ = driver.join();
                return Err(RecorderError::Spawn {
                    worker: FOLLOWER_THREAD,
                    source,
                });
            }
        };

        info!(
            period_ms = config.period.as_millis() as u64,
            capture_timeout_ms = config.capture_timeout.as_millis() as u64,
            "recorder workers running"
        );

        Ok(Self {
            handshake,
            buffers,
            stats,
            driver: Some(driver),
            follower: Some(follower),
            events,
            next_id: SessionId::default(),
            generation: 0,
            recording: None,
            demos: BTreeMap::new(),
        })
    }

    /// Begin recording into the next session slot.
    ///
    /// If a session is already recording it is thrown away and recording
    /// restarts into the same slot.
    pub fn start(&mut self) -> Result<StartedSession, RecorderError> {
        if let Some(reason) = self.handshake.fault() {
            return Err(RecorderError::Halted(reason));
        }
        if self.handshake.is_quit() {
            return Err(RecorderError::Halted("shutdown requested".to_string()));
        }

        let restarted = self.recording.is_some();
        if restarted {
            self.handshake.disarm();
        }

        self.generation += 1;
        let id = self.next_id;
        // Buffers are cleared before the flag goes up.
        let discarded = self.buffers.begin(self.generation, id);
        self.handshake.arm(self.generation);
        self.recording = Some(id);

        if restarted {
            warn!(session = %id, discarded, "restarted while recording; unsaved samples dropped");
        } else {
            info!(session = %id, "recording started");
        }

        Ok(StartedSession {
            id,
            restarted,
            discarded,
        })
    }

    /// Stop recording and keep the session. `None` if nothing was recording.
    pub fn save(&mut self) -> Option<SavedSession> {
        self.handshake.disarm();
        let closed = self.buffers.take()?;
        self.recording = None;

        let (demo, trim) = closed.buffer.finalize();
        if let Some(t) = trim {
            self.stats.record_tail_trimmed();
            warn!(
                session = %closed.id,
                states = t.states,
                frames = t.frames,
                kept = t.kept,
                "state/frame lengths differed; trimmed to the shorter"
            );
        }

        let saved = SavedSession {
            id: closed.id,
            steps: demo.len(),
            trim,
        };
        self.demos.insert(closed.id, demo);
        self.next_id = closed.id.next();
        self.stats.record_session_saved();
        info!(session = %saved.id, steps = saved.steps, "session saved");

        Some(saved)
    }

    /// Stop recording and discard the session. The slot is reused by the
    /// next `start`. `None` if nothing was recording.
    pub fn reject(&mut self) -> Option<RejectedSession> {
        self.handshake.disarm();
        let closed = self.buffers.take()?;
        self.recording = None;
        self.stats.record_session_rejected();

        let rejected = RejectedSession {
            id: closed.id,
            states: closed.buffer.states.len(),
            frames: closed.buffer.frames.len(),
        };
        info!(session = %rejected.id, states = rejected.states, "session rejected");
        Some(rejected)
    }

    /// Stop both workers and hand back everything saved.
    ///
    /// A session still recording is discarded.
    pub fn quit(mut self) -> RecordingSummary {
        self.stop_workers();

        if let Some(closed) = self.buffers.take() {
            warn!(
                session = %closed.id,
                states = closed.buffer.states.len(),
                "quit while recording; unsaved session discarded"
            );
        }
        self.recording = None;

        let summary = RecordingSummary {
            demos: std::mem::take(&mut self.demos),
            fault: self.handshake.fault(),
        };
        info!(saved = summary.saved_count(), "recorder stopped");
        summary
    }

    /// Faults reported by the workers.
    pub fn events(&self) -> &Receiver<RecorderEvent> {
        &self.events
    }

    pub fn fault(&self) -> Option<String> {
        self.handshake.fault()
    }

    /// The session currently recording.
    pub fn recording(&self) -> Option<SessionId> {
        self.recording
    }

    pub fn saved_count(&self) -> usize {
        self.demos.len()
    }

    /// Lengths of the (states, frames) buffers of the active session.
    pub fn buffered(&self) -> (usize, usize) {
        self.buffers.lengths()
    }

    fn stop_workers(&mut self) {
        self.handshake.shutdown();

        for (worker, handle) in [
            (DRIVER_THREAD, self.driver.take()),
            (FOLLOWER_THREAD, self.follower.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!("{}", RecorderError::WorkerPanicked(worker));
                }
            }
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("next_id", &self.next_id)
            .field("recording", &self.recording)
            .field("saved", &self.demos.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimulatedArm, SimulatedCamera};
    use crate::stats::create_shared_stats;
    use std::time::Duration;

    fn controller(camera: SimulatedCamera) -> SessionController {
        let config = Config {
            period: Duration::from_millis(50),
            capture_poll: Duration::from_millis(10),
            capture_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        SessionController::spawn(&config, SimulatedArm::new(), camera, create_shared_stats())
            .unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(SessionCommand::parse("b"), Ok(SessionCommand::Start));
        assert_eq!(SessionCommand::parse(" N\n"), Ok(SessionCommand::Save));
        assert_eq!(SessionCommand::parse("m"), Ok(SessionCommand::Reject));
        assert_eq!("q".parse::<SessionCommand>(), Ok(SessionCommand::Quit));

        let err = SessionCommand::parse("x").unwrap_err();
        assert_eq!(err.input, "x");
        assert!(err.to_string().contains(USAGE));
        assert!(SessionCommand::parse("").is_err());
        assert!(SessionCommand::parse("bn").is_err());
    }

    #[test]
    fn test_save_and_reject_without_session_are_noops() {
        let mut ctl = controller(SimulatedCamera::new(4, 4));
        assert!(ctl.save().is_none());
        assert!(ctl.reject().is_none());
        assert_eq!(ctl.saved_count(), 0);
        assert_eq!(ctl.quit().saved_count(), 0);
    }

    #[test]
    fn test_saved_sessions_take_consecutive_ids() {
        let mut ctl = controller(SimulatedCamera::new(4, 4));

        assert_eq!(ctl.start().unwrap().id, SessionId(0));
        thread::sleep(Duration::from_millis(130));
        let first = ctl.save().unwrap();
        assert_eq!(first.id, SessionId(0));
        assert!(first.steps >= 1);

        assert_eq!(ctl.start().unwrap().id, SessionId(1));
        ctl.reject().unwrap();
        assert_eq!(ctl.start().unwrap().id, SessionId(1));
        assert_eq!(ctl.recording(), Some(SessionId(1)));

        let summary = ctl.quit();
        assert_eq!(summary.saved_count(), 1);
        assert!(summary.fault.is_none());
        let demo = &summary.demos[&SessionId(0)];
        assert_eq!(demo.states().len(), demo.frames().len());
    }

    #[test]
    fn test_start_after_quit_requested_is_refused() {
        let mut ctl = controller(SimulatedCamera::new(4, 4));
        ctl.handshake.shutdown();
        assert!(matches!(ctl.start(), Err(RecorderError::Halted(_))));
    }
}
