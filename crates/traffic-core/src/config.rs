use crate::endpoint::Profile;
use crate::error::ConfigError;
use crate::progress::ProgressMode;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub endpoints: EndpointPaths,
    pub run: RunConfig,
    pub background: BackgroundConfig,
    pub report: ReportConfig,
    pub progress: ProgressConfig,
    /// Default tracing filter when RUST_LOG is not set
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.target.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.target.base_url.clone(),
            reason: e.to_string(),
        })?;

        if self.target.timeout_ms == 0 {
            return Err(ConfigError::Zero("target.timeout_ms"));
        }
        if self.run.duration_secs == 0 {
            return Err(ConfigError::Zero("run.duration_secs"));
        }
        if self.progress.tick_ms == 0 {
            return Err(ConfigError::Zero("progress.tick_ms"));
        }
        if self.background.min_delay_ms > self.background.max_delay_ms {
            return Err(ConfigError::InvertedRange {
                field: "background delay",
                min: self.background.min_delay_ms,
                max: self.background.max_delay_ms,
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.target.timeout_ms)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run.duration_secs)
    }

    /// Grace period for joining background tasks at shutdown. Defaults to one
    /// full producer period plus one request timeout.
    pub fn shutdown_grace(&self) -> Duration {
        match self.run.shutdown_grace_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(
                self.background.max_delay_ms + self.target.timeout_ms + 1_000,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base address of the service under test
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Which endpoint kinds make up a round
    pub profile: Profile,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5050".to_string(),
            timeout_ms: 1_000,
            profile: Profile::Classic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    /// The delay is appended as a trailing path segment
    pub sleep: String,
    pub instant_a: String,
    pub instant_b: String,
    pub stream: String,
    pub failing: String,
    pub exception: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            sleep: "/sleep".to_string(),
            instant_a: "/test1".to_string(),
            instant_b: "/test2".to_string(),
            stream: "/stream".to_string(),
            failing: "/fail-request".to_string(),
            exception: "/raise-exception".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Total run time before the deadline fires
    pub duration_secs: u64,
    /// Pause between consecutive rounds
    pub round_pause_ms: u64,
    /// Upper bound (inclusive) of each kind's per-round batch size
    pub max_batch_size: u32,
    /// Seed for reproducible request mixes; entropy when absent
    pub seed: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: 1_800,
            round_pause_ms: 100,
            max_batch_size: 14,
            seed: None,
            shutdown_grace_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 5_000,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Append-only plain-text run log
    pub path: PathBuf,
    /// Optional directory for a JSON summary per run
    pub json_dir: Option<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("request_count.log"),
            json_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub tick_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: ProgressMode::Bar,
            tick_ms: 300,
        }
    }
}
