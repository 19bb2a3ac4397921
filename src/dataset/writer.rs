//! Persistence of finished trajectory sets.

use crate::dataset::{DatasetError, TrajectorySet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File stem used when the instruction yields nothing usable.
const DEFAULT_STEM: &str = "demo";

/// Durable storage for a completed set of sessions.
pub trait DatasetWriter {
    /// Store `set`, returning where it was written.
    fn persist(&self, set: &TrajectorySet) -> Result<PathBuf, DatasetError>;
}

/// Writes each set as `<root>/<instruction>.json`.
#[derive(Debug, Clone)]
pub struct JsonDatasetWriter {
    root: PathBuf,
}

impl JsonDatasetWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a set with `instruction` would be written to.
    pub fn path_for(&self, instruction: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(instruction)))
    }
}

impl DatasetWriter for JsonDatasetWriter {
    fn persist(&self, set: &TrajectorySet) -> Result<PathBuf, DatasetError> {
        std::fs::create_dir_all(&self.root)?;

        let path = self.path_for(&set.instruction);
        if path.exists() {
            warn!(path = %path.display(), "overwriting existing dataset");
        }

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = path.with_extension("json.partial");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut out, set).map_err(DatasetError::Serialize)?;
            out.flush()?;
        }
        std::fs::rename(&tmp, &path)?;

        info!(
            path = %path.display(),
            demos = set.len(),
            "dataset written"
        );
        Ok(path)
    }
}

/// Read a dataset written by [`JsonDatasetWriter`].
pub fn load_dataset(path: &Path) -> Result<TrajectorySet, DatasetError> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(DatasetError::Parse)
}

/// Turn a free-text instruction into a safe file stem.
fn file_stem(instruction: &str) -> String {
    let stem: String = instruction
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if stem.is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dataset::{DatasetMetadata, Demo, SessionId};
    use crate::device::{to_canonical_color, PixelFormat, RawFrame, StateSample, STATE_DIM};
    use std::collections::BTreeMap;

    fn sample_set(instruction: &str) -> TrajectorySet {
        let frame = to_canonical_color(RawFrame {
            width: 2,
            height: 1,
            format: PixelFormat::Bgr8,
            data: vec![1, 2, 3, 4, 5, 6],
        });
        let demo = Demo::new(
            vec![StateSample::new([0.5; STATE_DIM])],
            vec![frame],
        )
        .unwrap();
        TrajectorySet::new(
            instruction,
            DatasetMetadata::for_config(&Config::default()),
            BTreeMap::from([(SessionId(0), demo)]),
        )
    }

    #[test]
    fn test_file_stem_sanitising() {
        assert_eq!(file_stem("pick up the cube"), "pick up the cube");
        assert_eq!(file_stem("a/b\\c"), "a_b_c");
        assert_eq!(file_stem("   "), "demo");
        assert_eq!(file_stem("../.."), "_");
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonDatasetWriter::new(dir.path().join("out"));
        let set = sample_set("stack blocks");

        let path = writer.persist(&set).unwrap();
        assert_eq!(path, dir.path().join("out").join("stack blocks.json"));
        assert!(!path.with_extension("json.partial").exists());

        let loaded = load_dataset(&path).unwrap();
        assert_eq!(loaded, set);
        let demo = &loaded.demos[&SessionId(0)];
        assert_eq!(demo.frames()[0].data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_load_rejects_misaligned_demo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let set = sample_set("x");
        let mut value = serde_json::to_value(&set).unwrap();
        value["demos"]["demo_0"]["rgb"] = serde_json::json!([]);
        std::fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(load_dataset(&path), Err(DatasetError::Parse(_))));
    }
}
