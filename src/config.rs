//! Configuration for the demonstration recorder.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sampling period; recording frequency is `1 / period`
    #[serde(with = "duration_millis")]
    pub period: Duration,

    /// Single wait slice handed to the camera per retry
    #[serde(with = "duration_millis")]
    pub capture_poll: Duration,

    /// Longest the follower keeps retrying for one tick before it counts as missed
    #[serde(with = "duration_millis")]
    pub capture_timeout: Duration,

    /// Camera stream settings
    pub camera: CameraConfig,

    /// Directory where finished datasets are written
    pub saved_path: PathBuf,

    /// Directory for cumulative recorder statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("demo-recorder");

        Self {
            period: Duration::from_millis(100),
            capture_poll: Duration::from_millis(100),
            capture_timeout: Duration::from_millis(1000),
            camera: CameraConfig::default(),
            saved_path: PathBuf::from("./dataset"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("demo-recorder")
            .join("config.json")
    }

    /// Ensure all output directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.saved_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Reject settings the sampling loops cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::Invalid("period must be non-zero".into()));
        }
        if self.capture_poll.is_zero() {
            return Err(ConfigError::Invalid("capture_poll must be non-zero".into()));
        }
        if self.capture_timeout < self.capture_poll {
            return Err(ConfigError::Invalid(
                "capture_timeout must cover at least one capture_poll slice".into(),
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid("camera dimensions must be non-zero".into()));
        }
        Ok(())
    }

    /// Recording frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }
}

/// Camera stream settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.period, Duration::from_millis(100));
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert!((config.frequency_hz() - 10.0).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.period = Duration::from_millis(200);
        config.saved_path = PathBuf::from("/tmp/out");
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.period, Duration::from_millis(200));
        assert_eq!(loaded.saved_path, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.period, Config::default().period);
    }

    #[test]
    fn test_validation_rejects_bad_timing() {
        let mut config = Config::default();
        config.period = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.capture_timeout = Duration::from_millis(10);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
