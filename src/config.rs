//! Configuration for the sensor sweep.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for a collection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of the collection window
    #[serde(with = "duration_ms")]
    pub window_duration: Duration,

    /// How long the warm-up camera capture may take before it is detached
    #[serde(with = "duration_ms")]
    pub warmup_grace: Duration,

    /// How long continuous producers get to flush once told to stop
    #[serde(with = "duration_ms")]
    pub drain_grace: Duration,

    /// Time box for the trailing screenshot and window enumeration
    #[serde(with = "duration_ms")]
    pub screen_grace: Duration,

    /// Settle time between opening the camera and reading a frame
    #[serde(with = "duration_ms")]
    pub camera_warmup: Duration,

    /// Clipboard poll interval
    #[serde(with = "duration_ms")]
    pub clipboard_interval: Duration,

    /// Audio capture parameters
    pub audio: AudioConfig,

    /// Telemetry log file settings
    pub log: LogConfig,

    /// Publishing settings
    pub publish: PublishConfig,

    /// Directory receiving the fixed-name artifacts of a run
    pub output_dir: PathBuf,

    /// Root directory for agent state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-sweep");

        Self {
            window_duration: Duration::from_secs(5),
            warmup_grace: Duration::from_secs(3),
            drain_grace: Duration::from_secs(2),
            screen_grace: Duration::from_secs(1),
            camera_warmup: Duration::from_millis(500),
            clipboard_interval: Duration::from_millis(100),
            audio: AudioConfig::default(),
            log: LogConfig::default(),
            publish: PublishConfig::default(),
            output_dir: data_dir.join("data_collection"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-sweep")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.data_path)?;
        std::fs::create_dir_all(self.outbox_dir())?;
        Ok(())
    }

    /// Store-and-forward directory for published archives.
    pub fn outbox_dir(&self) -> PathBuf {
        self.data_path.join("outbox")
    }

    /// Where the bundle archive is assembled before hand-off.
    pub fn archive_path(&self) -> PathBuf {
        self.data_path.join("data_collection.zip")
    }

    /// Path of the rotating telemetry log.
    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(&self.log.file_name)
    }

    /// Check the timing and sizing constraints the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_duration.is_zero() {
            return Err(ConfigError::Invalid("window_duration must be positive".into()));
        }
        if self.warmup_grace >= self.window_duration {
            return Err(ConfigError::Invalid(format!(
                "warmup_grace ({:?}) must be shorter than window_duration ({:?})",
                self.warmup_grace, self.window_duration
            )));
        }
        if self.clipboard_interval.is_zero() {
            return Err(ConfigError::Invalid("clipboard_interval must be positive".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.chunk_frames == 0 {
            return Err(ConfigError::Invalid(
                "audio sample_rate and chunk_frames must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Audio input parameters. Samples are always 16-bit mono.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_frames: 1024,
        }
    }
}

/// Rotation policy for the telemetry log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub file_name: String,
    pub max_bytes: u64,
    pub backups: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_name: "process_run.log".to_string(),
            max_bytes: 5 * 1024 * 1024,
            backups: 3,
        }
    }
}

/// Settings for the archive hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub enabled: bool,
    pub max_attachment_bytes: u64,
    pub allow_insecure: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attachment_bytes: 25 * 1024 * 1024,
            allow_insecure: false,
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
mod duration_ms {
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
