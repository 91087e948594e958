//! Configuration for the toxnet pipeline.

use crate::core::averaging::AveragingPolicy;
use crate::network::EstimatorSettings;
use crate::perspective::PerspectiveConfig;
use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration, shared by all stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Column names in the tabular input files
    pub columns: ColumnConfig,

    /// Resampling parameters
    pub resample: ResampleConfig,

    /// Settings handed to the network inference routine
    pub estimation: EstimatorSettings,

    /// Scoring service connection
    pub perspective: PerspectiveConfig,

    /// API key for the scoring service, if not given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Path for the cumulative run log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("toxnet");

        Self {
            columns: ColumnConfig::default(),
            resample: ResampleConfig::default(),
            estimation: EstimatorSettings::default(),
            perspective: PerspectiveConfig::default(),
            api_key: None,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("toxnet")
            .join("config.json")
    }

    /// Path of the cumulative run log.
    pub fn run_log_path(&self) -> PathBuf {
        self.data_path.join("run_log.json")
    }

    /// Reject values the stages cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resample.validate()?;
        self.estimation
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Names of the columns the stages read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub toxicity: String,
    pub source: String,
    pub datetime: String,
    pub retox: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            toxicity: "toxicity".to_string(),
            source: "source".to_string(),
            datetime: "date".to_string(),
            retox: "retox".to_string(),
        }
    }
}

impl ColumnConfig {
    /// Replace the names that were given explicitly.
    pub fn with_overrides(
        mut self,
        toxicity: Option<String>,
        source: Option<String>,
        datetime: Option<String>,
        retox: Option<String>,
    ) -> Self {
        if let Some(v) = toxicity {
            self.toxicity = v;
        }
        if let Some(v) = source {
            self.source = v;
        }
        if let Some(v) = datetime {
            self.datetime = v;
        }
        if let Some(v) = retox {
            self.retox = v;
        }
        self
    }
}

/// Parameters of the bucketing and averaging stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Bucket length in minutes (also the short averaging window)
    pub bucket_minutes: u32,
    /// Minimum observations for short-window averaging
    pub short_min_count: usize,
    /// Trailing fallback window in hours
    pub long_window_hours: u32,
    /// Most recent observations kept from the fallback window
    pub long_max_samples: usize,
    /// IANA zone for timestamps written without an offset
    pub timezone: String,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            bucket_minutes: 5,
            short_min_count: 5,
            long_window_hours: 24,
            long_max_samples: 5,
            timezone: "UTC".to_string(),
        }
    }
}

impl ResampleConfig {
    pub fn bucket_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.bucket_minutes))
    }

    pub fn policy(&self) -> AveragingPolicy {
        AveragingPolicy {
            short_window: self.bucket_interval(),
            short_min_count: self.short_min_count,
            long_window: Duration::hours(i64::from(self.long_window_hours)),
            long_max_samples: self.long_max_samples,
        }
    }

    /// Parse the configured time zone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid(format!("time zone '{}': {e}", self.timezone)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_minutes == 0 {
            return Err(ConfigError::Invalid("bucket_minutes must be positive".to_string()));
        }
        if self.short_min_count == 0 {
            return Err(ConfigError::Invalid(
                "short_min_count must be positive".to_string(),
            ));
        }
        if self.long_max_samples == 0 {
            return Err(ConfigError::Invalid(
                "long_max_samples must be positive".to_string(),
            ));
        }
        self.timezone().map(|_| ())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
