use crate::config::ThresholdConfig;
use crate::core_modules::metrics::MetricSample;

/// The static threshold test: fog is likely when the scene is lit enough to
/// trust the blur reading and the blur variance is low. Both comparisons are
/// inclusive.
pub fn apply_rule(sample: &MetricSample, thresh_brightness: f64, thresh_blur: f64) -> bool {
    sample.brightness >= thresh_brightness && sample.blur_variance <= thresh_blur
}

/// `apply_rule` with thresholds taken from the configuration.
pub fn apply_configured_rule(sample: &MetricSample, thresholds: &ThresholdConfig) -> bool {
    apply_rule(sample, thresholds.brightness as f64, thresholds.blur as f64)
}
