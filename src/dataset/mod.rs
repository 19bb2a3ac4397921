//! Completed demonstrations and the dataset they are saved into.
//!
//! A [`TrajectorySet`] maps session identifiers (`demo_0`, `demo_1`, ...) to
//! aligned `(states, frames)` pairs and carries one free-text instruction for
//! the whole set.

pub mod writer;

use crate::config::Config;
use crate::device::{Frame, StateSample, STATE_DIM};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub use writer::{load_dataset, DatasetWriter, JsonDatasetWriter};

/// The name of this producer.
pub const PRODUCER_NAME: &str = "demo-recorder";

/// Identifier of one recording session, rendered as `demo_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub u32);

impl SessionId {
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "demo_{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("demo_")
            .and_then(|n| n.parse().ok())
            .map(SessionId)
            .ok_or_else(|| DatasetError::BadSessionId(s.to_string()))
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One finalized session: equally long state and frame sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DemoRepr")]
pub struct Demo {
    #[serde(rename = "state")]
    states: Vec<StateSample>,
    #[serde(rename = "rgb")]
    frames: Vec<Frame>,
}

#[derive(Deserialize)]
struct DemoRepr {
    state: Vec<StateSample>,
    rgb: Vec<Frame>,
}

impl TryFrom<DemoRepr> for Demo {
    type Error = DatasetError;

    fn try_from(repr: DemoRepr) -> Result<Self, Self::Error> {
        Demo::new(repr.state, repr.rgb)
    }
}

impl Demo {
    /// Build a demo; the two sequences must be the same length.
    pub fn new(states: Vec<StateSample>, frames: Vec<Frame>) -> Result<Self, DatasetError> {
        if states.len() != frames.len() {
            return Err(DatasetError::Misaligned {
                states: states.len(),
                frames: frames.len(),
            });
        }
        Ok(Self { states, frames })
    }

    /// Build from sequences the caller has already truncated to one length.
    pub(crate) fn from_aligned(states: Vec<StateSample>, frames: Vec<Frame>) -> Self {
        debug_assert_eq!(states.len(), frames.len());
        Self { states, frames }
    }

    pub fn states(&self) -> &[StateSample] {
        &self.states
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of aligned (state, frame) pairs.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Provenance recorded alongside a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub producer: String,
    pub version: String,
    pub instance_id: Uuid,
    pub host: String,
    pub created_at: DateTime<Utc>,
    pub period_ms: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub state_dim: usize,
}

impl DatasetMetadata {
    /// Describe a dataset recorded with `config` on this machine.
    pub fn for_config(config: &Config) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            producer: PRODUCER_NAME.to_string(),
            version: crate::VERSION.to_string(),
            instance_id: Uuid::new_v4(),
            host,
            created_at: Utc::now(),
            period_ms: config.period.as_millis() as u64,
            frame_width: config.camera.width,
            frame_height: config.camera.height,
            state_dim: STATE_DIM,
        }
    }
}

/// All demos saved during one recorder run, plus their instruction label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySet {
    pub instruction: String,
    pub metadata: DatasetMetadata,
    pub demos: BTreeMap<SessionId, Demo>,
}

impl TrajectorySet {
    pub fn new(
        instruction: impl Into<String>,
        metadata: DatasetMetadata,
        demos: BTreeMap<SessionId, Demo>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            metadata,
            demos,
        }
    }

    pub fn len(&self) -> usize {
        self.demos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demos.is_empty()
    }

    /// Structural overview for display.
    pub fn summary(&self) -> DatasetSummary {
        let first_frame = self.demos.values().find_map(|d| d.frames().first());
        DatasetSummary {
            instruction: self.instruction.clone(),
            demo_lengths: self.demos.iter().map(|(id, d)| (*id, d.len())).collect(),
            state_dim: self.metadata.state_dim,
            frame_size: first_frame.map(|f| (f.width(), f.height())),
            created_at: self.metadata.created_at,
            period_ms: self.metadata.period_ms,
        }
    }
}

/// Shape of a saved dataset, without the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub instruction: String,
    pub demo_lengths: Vec<(SessionId, usize)>,
    pub state_dim: usize,
    pub frame_size: Option<(u32, u32)>,
    pub created_at: DateTime<Utc>,
    pub period_ms: u64,
}

impl DatasetSummary {
    pub fn total_steps(&self) -> usize {
        self.demo_lengths.iter().map(|(_, n)| n).sum()
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instruction: {}", self.instruction)?;
        writeln!(
            f,
            "Recorded: {} (period {} ms)",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.period_ms
        )?;
        writeln!(f, "Demos: {}", self.demo_lengths.len())?;
        for (id, len) in &self.demo_lengths {
            writeln!(f, "  {id}: {len} steps")?;
        }
        writeln!(f, "State shape: (N, {})", self.state_dim)?;
        match self.frame_size {
            Some((w, h)) => writeln!(f, "Frame shape: (N, {h}, {w}, 3)")?,
            None => writeln!(f, "Frame shape: none")?,
        }
        write!(f, "Total steps: {}", self.total_steps())
    }
}

/// Dataset errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("state/frame length mismatch: {states} states, {frames} frames")]
    Misaligned { states: usize, frames: usize },
    #[error("invalid session id: {0}")]
    BadSessionId(String),
}
