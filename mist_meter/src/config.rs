// THEORY:
// All static settings live in one `MeterConfig`, read from a TOML file once at
// startup and handed by reference to each stage. Nothing below this module
// looks settings up on its own. Validation happens here too, so every stage
// can rely on the ROI lying inside the target frame and on thresholds being
// usable numbers.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_ENV_VAR: &str = "MIST_METER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mist_meter/config.toml";

/// The full, validated configuration for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    pub roi: Roi,
    pub threshold: ThresholdConfig,
    #[serde(default)]
    pub classifier: ClassifierParams,
    pub influx: InfluxConfig,
    pub sheets: SheetsConfig,
    pub signal: SignalConfig,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// The frame the camera process keeps overwriting.
    pub image: PathBuf,
    /// Where the grayscale ROI crop goes for operator inspection.
    pub output: Option<PathBuf>,
    /// Archive directory for annotated alert frames.
    pub fog_folder: PathBuf,
    /// Labeled (blur, brightness, mist) history.
    pub calibration: PathBuf,
    /// Optional JSON cache of the fitted classifier.
    pub model_cache: Option<PathBuf>,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

/// Target resolution every frame is resampled to before measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Axis-aligned region of interest in target-resolution coordinates.
/// `x2`/`y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Roi {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Roi {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn fits_in(&self, frame: &FrameConfig) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2 && self.x2 <= frame.width && self.y2 <= frame.height
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum ROI brightness for the blur reading to be trusted (night exclusion).
    pub brightness: i64,
    /// Maximum blur variance still counted as fog.
    pub blur: i64,
    /// Classifier probabilities below this are surfaced for review.
    #[serde(default = "default_certainty_floor")]
    pub certainty_floor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    /// SVM soft-margin penalty.
    pub c: f64,
    pub min_samples_per_class: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            min_samples_per_class: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Measurement name written as the first token of each line.
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    /// signal-cli JSON-RPC endpoint, e.g. `http://localhost:8080/api/v1/rpc`.
    pub url: String,
    pub account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub number: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// A lock older than this is treated as left behind by a crashed run.
/// A live run can spend up to three sink timeouts on the network, so the
/// limit has to leave room for that plus `LOCK_HEADROOM_SECS`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub stale_after_secs: u64,
}

pub const LOCK_HEADROOM_SECS: u64 = 60;

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 900,
        }
    }
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("mist_meter.lock")
}

fn default_certainty_floor() -> f64 {
    0.3
}

impl MeterConfig {
    /// Loads from `$MIST_METER_CONFIG`, or the default system path.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: MeterConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame size {}x{} is empty",
                self.frame.width, self.frame.height
            )));
        }
        if !self.roi.fits_in(&self.frame) {
            return Err(ConfigError::Invalid(format!(
                "roi ({}, {})-({}, {}) must satisfy x1<x2, y1<y2 and lie inside {}x{}",
                self.roi.x1, self.roi.y1, self.roi.x2, self.roi.y2, self.frame.width, self.frame.height
            )));
        }
        let floor = self.threshold.certainty_floor;
        if !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::Invalid(format!("certainty_floor {floor} outside [0, 1]")));
        }
        if !(self.classifier.c.is_finite() && self.classifier.c > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "classifier.c must be a positive number, got {}",
                self.classifier.c
            )));
        }
        if self.classifier.min_samples_per_class == 0 {
            return Err(ConfigError::Invalid("classifier.min_samples_per_class must be at least 1".into()));
        }
        let busiest_run = self.network.timeout_secs.saturating_mul(3).saturating_add(LOCK_HEADROOM_SECS);
        if self.lock.stale_after_secs < busiest_run {
            return Err(ConfigError::Invalid(format!(
                "lock.stale_after_secs {} must be at least {busiest_run} (3 x network.timeout_secs + {LOCK_HEADROOM_SECS})",
                self.lock.stale_after_secs
            )));
        }
        if self.recipients.iter().any(|r| r.number.trim().is_empty()) {
            return Err(ConfigError::Invalid("recipient with an empty number".into()));
        }
        Ok(())
    }

    pub fn recipient_numbers(&self) -> Vec<String> {
        self.recipients.iter().map(|r| r.number.clone()).collect()
    }
}
