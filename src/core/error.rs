//! Errors and out-of-band events raised by the recorder workers.

use crate::config::ConfigError;
use crate::device::SensorError;
use std::fmt;
use thiserror::Error;

/// Recorder errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    #[error("could not spawn {worker} thread: {source}")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("recorder halted: {0}")]
    Halted(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Something the operator should hear about without asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// A worker stopped on its own; both loops have been shut down.
    WorkerFault { worker: &'static str, reason: String },
}

impl fmt::Display for RecorderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderEvent::WorkerFault { worker, reason } => {
                write!(f, "{worker} stopped: {reason}")
            }
        }
    }
}
