use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ClassifierParams;
use crate::core_modules::classifier::MistClassifier;
use crate::core_modules::classifier::calibration::CalibrationSet;
use crate::error::ClassifierFitError;

/// On-disk form of a fitted model. Only valid for the calibration set whose
/// digest it carries, fitted with the same parameters.
#[derive(Debug, Serialize, Deserialize)]
struct CachedModel {
    calibration_digest: String,
    params: ClassifierParamsKey,
    model: MistClassifier,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ClassifierParamsKey {
    c: f64,
    min_samples_per_class: usize,
}

impl From<&ClassifierParams> for ClassifierParamsKey {
    fn from(p: &ClassifierParams) -> Self {
        Self {
            c: p.c,
            min_samples_per_class: p.min_samples_per_class,
        }
    }
}

/// Returns the cached model when it matches `set`, otherwise fits a new one
/// and writes it back. Cache I/O problems only cost a refit.
pub fn fit_or_load(
    cache_path: &Path,
    set: &CalibrationSet,
    params: &ClassifierParams,
) -> Result<MistClassifier, ClassifierFitError> {
    let key = ClassifierParamsKey::from(params);
    match read(cache_path) {
        Some(cached) if cached.calibration_digest == set.digest && cached.params == key => {
            tracing::debug!(path = %cache_path.display(), "using cached classifier");
            return Ok(cached.model);
        }
        Some(_) => tracing::debug!(path = %cache_path.display(), "cached classifier is stale, refitting"),
        None => {}
    }

    let model = MistClassifier::fit(set, params)?;
    let entry = CachedModel {
        calibration_digest: set.digest.clone(),
        params: key,
        model,
    };
    if let Err(e) = write(cache_path, &entry) {
        tracing::warn!(path = %cache_path.display(), error = %e, "could not write classifier cache");
    }
    Ok(entry.model)
}

fn read(path: &Path) -> Option<CachedModel> {
    let data = std::fs::read(path).ok()?;
    match serde_json::from_slice(&data) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable classifier cache");
            None
        }
    }
}

fn write(path: &Path, entry: &CachedModel) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(entry)?;
    std::fs::write(path, json)
}
