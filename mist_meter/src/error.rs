// THEORY:
// Every failure the pipeline can hit is named here, grouped by the stage that
// owns it. The grouping mirrors the run policy: image errors end the run,
// calibration and fit errors switch the classifier off for the run, and sink
// errors are logged per sink and never travel further than the dispatcher.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a pipeline run (or keep it from starting).
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    CalibrationLoad(#[from] CalibrationLoadError),
    #[error(transparent)]
    ClassifierFit(#[from] ClassifierFitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("another run holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error("lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("overlay font is unreadable: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
}

#[derive(Debug, Error)]
pub enum CalibrationLoadError {
    #[error("cannot read calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed calibration file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("calibration file {path} row {row}: {reason}")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        reason: String,
    },
    #[error("calibration file {0} contains no records")]
    Empty(PathBuf),
}

#[derive(Debug, Error, PartialEq)]
pub enum ClassifierFitError {
    #[error("calibration set only contains {} samples ({count}); need both classes", class_name(.mist))]
    SingleClass { mist: bool, count: usize },
    #[error("calibration set has {count} {} samples, at least {required} required", class_name(.mist))]
    InsufficientSamples {
        mist: bool,
        count: usize,
        required: usize,
    },
    #[error("calibration features have zero spread; the classes cannot be separated")]
    DegenerateFeatures,
    #[error("svm fit failed: {0}")]
    Solver(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn class_name(mist: &bool) -> &'static str {
    if *mist { "mist" } else { "no-mist" }
}

/// A single sink's failure. Reported, never retried, never fatal.
#[derive(Debug, Error)]
pub enum SinkDispatchError {
    #[error("{sink}: request failed: {source}")]
    Transport {
        sink: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{sink}: rejected with status {status}: {body}")]
    Rejected {
        sink: &'static str,
        status: u16,
        body: String,
    },
    #[error("{sink}: unexpected response: {detail}")]
    Response { sink: &'static str, detail: String },
}

impl SinkDispatchError {
    pub fn sink(&self) -> &'static str {
        match self {
            Self::Transport { sink, .. } | Self::Rejected { sink, .. } | Self::Response { sink, .. } => *sink,
        }
    }
}
