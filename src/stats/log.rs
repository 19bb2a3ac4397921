//! Counters describing what the recorder did.
//!
//! Counters are lock-free; acknowledgement latencies are kept in a bounded
//! window and summarised with `statrs`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Most recent acknowledgement latencies kept for the summary.
const LATENCY_WINDOW: usize = 10_000;

/// Recorder statistics for the current run.
#[derive(Debug)]
pub struct RecorderStats {
    /// Ticks broadcast by the sampling driver
    ticks_dispatched: AtomicU64,
    /// Frames appended by the capture follower
    frames_captured: AtomicU64,
    /// Ticks whose frame did not arrive within the capture window
    missed_ticks: AtomicU64,
    /// Ticks dropped because recording stopped mid-acquisition
    abandoned_ticks: AtomicU64,
    /// Deadlines that had already passed when the driver reached them
    overruns: AtomicU64,
    /// Sessions saved
    sessions_saved: AtomicU64,
    /// Sessions rejected
    sessions_rejected: AtomicU64,
    /// Saves that needed a tail trim
    tails_trimmed: AtomicU64,
    /// Tick dispatch to acknowledgement, in milliseconds
    ack_latencies_ms: Mutex<VecDeque<f64>>,
    /// Run start time
    run_start: DateTime<Utc>,
    /// Path for persisting cumulative counters
    persist_path: Option<PathBuf>,
}

impl RecorderStats {
    pub fn new() -> Self {
        Self {
            ticks_dispatched: AtomicU64::new(0),
            frames_captured: AtomicU64::new(0),
            missed_ticks: AtomicU64::new(0),
            abandoned_ticks: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            sessions_saved: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
            tails_trimmed: AtomicU64::new(0),
            ack_latencies_ms: Mutex::new(VecDeque::new()),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics that accumulate into a file across runs.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!("could not load previous recorder stats: {e}");
        }

        stats
    }

    pub fn record_tick_dispatched(&self) {
        self.ticks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed_tick(&self) {
        self.missed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned_tick(&self) {
        self.abandoned_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_saved(&self) {
        self.sessions_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tail_trimmed(&self) {
        self.tails_trimmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_latency(&self, latency: Duration) {
        let mut window = self.ack_latencies_ms.lock();
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency.as_secs_f64() * 1000.0);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            ticks_dispatched: self.ticks_dispatched.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            missed_ticks: self.missed_ticks.load(Ordering::Relaxed),
            abandoned_ticks: self.abandoned_ticks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            sessions_saved: self.sessions_saved.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            tails_trimmed: self.tails_trimmed.load(Ordering::Relaxed),
            ack_latency: self.ack_latency(),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Mean, standard deviation and maximum of recent ack latencies.
    pub fn ack_latency(&self) -> Option<LatencySummary> {
        let window = self.ack_latencies_ms.lock();
        if window.is_empty() {
            return None;
        }
        let std_dev = if window.len() > 1 {
            window.iter().std_dev()
        } else {
            0.0
        };
        Some(LatencySummary {
            samples: window.len(),
            mean_ms: window.iter().mean(),
            std_dev_ms: std_dev,
            max_ms: Statistics::max(window.iter()),
        })
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let latency = match stats.ack_latency {
            Some(l) => format!(
                "{:.1} ms mean, {:.1} ms std-dev, {:.1} ms max ({} ticks)",
                l.mean_ms, l.std_dev_ms, l.max_ms, l.samples
            ),
            None => "n/a".to_string(),
        };
        format!(
            "Recorder Statistics:\n\
             - Ticks dispatched: {}\n\
             - Frames captured: {}\n\
             - Missed ticks: {}\n\
             - Abandoned ticks: {}\n\
             - Schedule overruns: {}\n\
             - Sessions saved: {}\n\
             - Sessions rejected: {}\n\
             - Tail trims: {}\n\
             - Camera ack latency: {}\n\
             - Run duration: {} seconds",
            stats.ticks_dispatched,
            stats.frames_captured,
            stats.missed_ticks,
            stats.abandoned_ticks,
            stats.overruns,
            stats.sessions_saved,
            stats.sessions_rejected,
            stats.tails_trimmed,
            latency,
            stats.run_duration_secs
        )
    }

    /// Save cumulative counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                ticks_dispatched: stats.ticks_dispatched,
                frames_captured: stats.frames_captured,
                missed_ticks: stats.missed_ticks,
                abandoned_ticks: stats.abandoned_ticks,
                overruns: stats.overruns,
                sessions_saved: stats.sessions_saved,
                sessions_rejected: stats.sessions_rejected,
                tails_trimmed: stats.tails_trimmed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.ticks_dispatched
                    .store(persisted.ticks_dispatched, Ordering::Relaxed);
                self.frames_captured
                    .store(persisted.frames_captured, Ordering::Relaxed);
                self.missed_ticks
                    .store(persisted.missed_ticks, Ordering::Relaxed);
                self.abandoned_ticks
                    .store(persisted.abandoned_ticks, Ordering::Relaxed);
                self.overruns.store(persisted.overruns, Ordering::Relaxed);
                self.sessions_saved
                    .store(persisted.sessions_saved, Ordering::Relaxed);
                self.sessions_rejected
                    .store(persisted.sessions_rejected, Ordering::Relaxed);
                self.tails_trimmed
                    .store(persisted.tails_trimmed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for RecorderStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Ack latency distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub max_ms: f64,
}

/// Snapshot of recorder statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderSnapshot {
    pub ticks_dispatched: u64,
    pub frames_captured: u64,
    pub missed_ticks: u64,
    pub abandoned_ticks: u64,
    pub overruns: u64,
    pub sessions_saved: u64,
    pub sessions_rejected: u64,
    pub tails_trimmed: u64,
    pub ack_latency: Option<LatencySummary>,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    ticks_dispatched: u64,
    frames_captured: u64,
    missed_ticks: u64,
    #[serde(default)]
    abandoned_ticks: u64,
    overruns: u64,
    sessions_saved: u64,
    sessions_rejected: u64,
    #[serde(default)]
    tails_trimmed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared recorder statistics.
pub type SharedRecorderStats = Arc<RecorderStats>;

pub fn create_shared_stats() -> SharedRecorderStats {
    Arc::new(RecorderStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedRecorderStats {
    Arc::new(RecorderStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = RecorderStats::new();
        stats.record_tick_dispatched();
        stats.record_tick_dispatched();
        stats.record_frame_captured();
        stats.record_missed_tick();

        let snap = stats.stats();
        assert_eq!(snap.ticks_dispatched, 2);
        assert_eq!(snap.frames_captured, 1);
        assert_eq!(snap.missed_ticks, 1);
        assert_eq!(snap.overruns, 0);
    }

    #[test]
    fn test_latency_summary() {
        let stats = RecorderStats::new();
        assert!(stats.ack_latency().is_none());

        for ms in [10, 20, 30] {
            stats.record_ack_latency(Duration::from_millis(ms));
        }
        let l = stats.ack_latency().unwrap();
        assert_eq!(l.samples, 3);
        assert!((l.mean_ms - 20.0).abs() < 1e-9);
        assert!((l.std_dev_ms - 10.0).abs() < 1e-9);
        assert!((l.max_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let stats = RecorderStats::with_persistence(path.clone());
        stats.record_session_saved();
        stats.record_tick_dispatched();
        stats.record_abandoned_tick();
        stats.record_abandoned_tick();
        stats.record_tail_trimmed();
        stats.save().unwrap();

        let reloaded = RecorderStats::with_persistence(path);
        let snap = reloaded.stats();
        assert_eq!(snap.sessions_saved, 1);
        assert_eq!(snap.ticks_dispatched, 1);
        assert_eq!(snap.abandoned_ticks, 2);
        assert_eq!(snap.tails_trimmed, 1);
    }

    #[test]
    fn test_loads_counters_file_without_newer_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let older = serde_json::json!({
            "ticks_dispatched": 4,
            "frames_captured": 4,
            "missed_ticks": 0,
            "overruns": 1,
            "sessions_saved": 1,
            "sessions_rejected": 0,
            "last_updated": "2026-01-01T00:00:00Z"
        });
        std::fs::write(&path, older.to_string()).unwrap();

        let snap = RecorderStats::with_persistence(path).stats();
        assert_eq!(snap.ticks_dispatched, 4);
        assert_eq!(snap.abandoned_ticks, 0);
        assert_eq!(snap.tails_trimmed, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = RecorderStats::new();
        let summary = stats.summary();
        assert!(summary.contains("Ticks dispatched"));
        assert!(summary.contains("Camera ack latency: n/a"));
    }
}
