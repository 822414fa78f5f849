// THEORY:
// The learned half of the decision. A linear SVM (linfa-svm, C-SVC) is fitted
// on the labeled calibration history, with blur and brightness as features
// and mist as the target. linfa's Platt scaling turns the SVM's decision value
// into a probability of mist.
//
// The model is cheap to fit, so by default it is refitted on every run and
// always reflects the calibration file as it is now. `cache` can keep a fitted
// model on disk, keyed by the calibration digest, which gives the same answer
// without refitting.
//
// Training data problems are errors, never silent defaults: a set with one
// class, or with fewer than the configured minimum samples per class, is
// refused.

pub mod cache;
pub mod calibration;
pub mod scaler;

use std::path::Path;

use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, arr1};
use serde::{Deserialize, Serialize};

use crate::config::ClassifierParams;
use crate::core_modules::metrics::MetricSample;
use crate::error::ClassifierFitError;

use self::calibration::CalibrationSet;
use self::scaler::{Features, Scaler};

/// What the classifier says about one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// True when the SVM places the sample on the mist side.
    pub label: bool,
    /// Probability the sigmoid assigns to `label`. Can fall below 0.5 when
    /// the margin and the calibrated probability disagree.
    pub probability: f64,
    /// Probability of mist, whatever the label.
    pub mist_probability: f64,
    pub decision_value: f64,
}

/// A fitted SVM with Platt coefficients, plus the scaler its inputs need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistClassifier {
    pub scaler: Scaler,
    pub svm: Svm<f64, Pr>,
}

impl MistClassifier {
    pub fn fit(set: &CalibrationSet, params: &ClassifierParams) -> Result<Self, ClassifierFitError> {
        let (mist, clear) = set.class_counts();
        if mist == 0 || clear == 0 {
            return Err(ClassifierFitError::SingleClass {
                mist: mist > 0,
                count: set.records.len(),
            });
        }
        for (is_mist, count) in [(true, mist), (false, clear)] {
            if count < params.min_samples_per_class {
                return Err(ClassifierFitError::InsufficientSamples {
                    mist: is_mist,
                    count,
                    required: params.min_samples_per_class,
                });
            }
        }

        let samples: Vec<Features> = set.records.iter().map(|r| features(r.blur, r.brightness)).collect();
        let scaler = Scaler::fit(&samples)?;
        let targets: Array1<bool> = set.records.iter().map(|r| r.mist).collect();
        let dataset = DatasetBase::new(scaler.records(&samples), targets);

        let svm = Svm::<f64, Pr>::params()
            .pos_neg_weights(params.c, params.c)
            .linear_kernel()
            .fit(&dataset)
            .map_err(|e| ClassifierFitError::Solver(e.to_string()))?;
        tracing::debug!(
            samples = samples.len(),
            mist,
            clear,
            support_vectors = svm.nsupport(),
            rho = svm.rho,
            "classifier fitted"
        );
        Ok(Self { scaler, svm })
    }

    pub fn predict(&self, sample: &MetricSample) -> Prediction {
        let x = arr1(&self.scaler.transform(&features(sample.blur_variance, sample.brightness)));
        let decision_value = self.svm.weighted_sum(&x) - self.svm.rho;
        let label = decision_value >= 0.0;
        let mist_probability = f64::from(*self.svm.predict(x));
        let probability = if label { mist_probability } else { 1.0 - mist_probability };
        Prediction {
            label,
            probability,
            mist_probability,
            decision_value,
        }
    }
}

/// Fits on `set` and predicts `sample` in one go.
pub fn classify(
    sample: &MetricSample,
    set: &CalibrationSet,
    params: &ClassifierParams,
) -> Result<Prediction, ClassifierFitError> {
    classify_cached(sample, set, params, None)
}

/// `classify`, reusing the model stored at `model_cache` when it was fitted
/// on this exact calibration set.
pub fn classify_cached(
    sample: &MetricSample,
    set: &CalibrationSet,
    params: &ClassifierParams,
    model_cache: Option<&Path>,
) -> Result<Prediction, ClassifierFitError> {
    let model = match model_cache {
        Some(path) => cache::fit_or_load(path, set, params)?,
        None => MistClassifier::fit(set, params)?,
    };
    let prediction = model.predict(sample);
    tracing::debug!(
        label = prediction.label,
        probability = prediction.probability,
        decision_value = prediction.decision_value,
        "classifier prediction"
    );
    Ok(prediction)
}

#[inline]
fn features(blur: f64, brightness: f64) -> Features {
    [blur, brightness]
}
