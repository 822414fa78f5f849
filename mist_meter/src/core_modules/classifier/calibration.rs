use std::path::Path;

use serde::{Deserialize, Deserializer, de};
use sha2::{Digest, Sha256};

use crate::error::CalibrationLoadError;

/// One labeled historical observation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalibrationRecord {
    pub blur: f64,
    pub brightness: f64,
    #[serde(deserialize_with = "flag")]
    pub mist: bool,
}

/// The labeled history the classifier is fitted on, plus a digest of the file
/// it came from so a cached model can be matched to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    pub records: Vec<CalibrationRecord>,
    pub digest: String,
}

impl CalibrationSet {
    pub fn from_records(records: Vec<CalibrationRecord>) -> Self {
        let mut hasher = Sha256::new();
        for r in &records {
            hasher.update(r.blur.to_le_bytes());
            hasher.update(r.brightness.to_le_bytes());
            hasher.update([r.mist as u8]);
        }
        Self {
            records,
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    /// (mist, no-mist) counts.
    pub fn class_counts(&self) -> (usize, usize) {
        let mist = self.records.iter().filter(|r| r.mist).count();
        (mist, self.records.len() - mist)
    }

}

/// Reads a CSV with at least `blur`, `brightness` and `mist` columns.
pub fn load_calibration(path: &Path) -> Result<CalibrationSet, CalibrationLoadError> {
    let bytes = std::fs::read(path).map_err(|source| CalibrationLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes.as_slice());

    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<CalibrationRecord>().enumerate() {
        let record = result.map_err(|source| CalibrationLoadError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        if !record.blur.is_finite() || !record.brightness.is_finite() {
            return Err(CalibrationLoadError::InvalidValue {
                path: path.to_path_buf(),
                row: row + 1,
                reason: format!("non-finite feature (blur={}, brightness={})", record.blur, record.brightness),
            });
        }
        records.push(record);
    }
    if records.is_empty() {
        return Err(CalibrationLoadError::Empty(path.to_path_buf()));
    }

    let digest = format!("{:x}", Sha256::digest(&bytes));
    tracing::debug!(path = %path.display(), records = records.len(), %digest, "calibration loaded");
    Ok(CalibrationSet { records, digest })
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" => Ok(true),
        "0" | "0.0" | "false" | "no" => Ok(false),
        other => Err(de::Error::custom(format!("expected a 0/1 mist label, got {other:?}"))),
    }
}
