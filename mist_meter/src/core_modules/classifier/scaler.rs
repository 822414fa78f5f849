// THEORY:
// Blur variance runs into the thousands while brightness stays under 255, so
// both features are z-scored before the SVM sees them. The statistics come
// from the calibration set and travel with the fitted model, which keeps a
// cached model and a fresh fit answering identically.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierFitError;

pub type Features = [f64; 2];

/// Z-score scaler for the two features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Features,
    pub scale: Features,
}

impl Scaler {
    pub fn fit(samples: &[Features]) -> Result<Self, ClassifierFitError> {
        let n = samples.len() as f64;
        let mut mean = [0.0; 2];
        let mut scale = [0.0; 2];
        for k in 0..2 {
            mean[k] = samples.iter().map(|s| s[k]).sum::<f64>() / n;
            let var = samples.iter().map(|s| (s[k] - mean[k]).powi(2)).sum::<f64>() / n;
            scale[k] = var.sqrt();
        }
        if scale.iter().all(|s| *s <= f64::EPSILON) {
            return Err(ClassifierFitError::DegenerateFeatures);
        }
        // A constant feature carries no information; leave it centered but unscaled.
        for s in &mut scale {
            if *s <= f64::EPSILON {
                *s = 1.0;
            }
        }
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Features) -> Features {
        [
            (x[0] - self.mean[0]) / self.scale[0],
            (x[1] - self.mean[1]) / self.scale[1],
        ]
    }

    /// Scaled samples as an `n x 2` record matrix.
    pub fn records(&self, samples: &[Features]) -> Array2<f64> {
        Array2::from_shape_fn((samples.len(), 2), |(i, k)| self.transform(&samples[i])[k])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizes_each_column() {
        let samples = [[10.0, 100.0], [30.0, 140.0]];
        let scaler = Scaler::fit(&samples).expect("scaler");
        assert_eq!(scaler.mean, [20.0, 120.0]);
        assert_eq!(scaler.scale, [10.0, 20.0]);
        let records = scaler.records(&samples);
        assert_eq!(records.shape(), &[2, 2]);
        assert_eq!(records[[0, 0]], -1.0);
        assert_eq!(records[[1, 1]], 1.0);
    }

    #[test]
    fn identical_samples_are_degenerate() {
        assert_eq!(
            Scaler::fit(&[[50.0, 120.0]; 4]).unwrap_err(),
            ClassifierFitError::DegenerateFeatures
        );
    }

    #[test]
    fn constant_feature_is_left_unscaled() {
        let scaler = Scaler::fit(&[[1.0, 5.0], [3.0, 5.0]]).expect("scaler");
        assert_eq!(scaler.scale[1], 1.0);
        assert_eq!(scaler.transform(&[2.0, 5.0]), [0.0, 0.0]);
    }
}
