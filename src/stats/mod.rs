//! Statistics about sampling, capture and session outcomes.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, LatencySummary, RecorderSnapshot,
    RecorderStats, SharedRecorderStats,
};
