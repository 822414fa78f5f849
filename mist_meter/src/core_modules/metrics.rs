// THEORY:
// The extractor turns one camera frame into the three numbers the rest of the
// pipeline works with:
// 1.  **Brightness**: mean luma over the ROI. Used to tell day from night.
// 2.  **Brightness spread**: population standard deviation of that luma.
// 3.  **Blur variance**: variance of the 3x3 Laplacian response over the ROI.
//     Fog washes out edges, so a clear scene scores high and a foggy one low.
//
// The Laplacian uses the `[0,1,0; 1,-4,1; 0,1,0]` kernel with mirrored
// (reflect-101) borders, the same response the historical calibration data
// was recorded with.

use std::path::Path;

use image::GrayImage;

use crate::config::MeterConfig;
use crate::core_modules::frame::{load_frame, roi_luma};
use crate::error::MeterError;

/// The measurement for one run. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub brightness: f64,
    pub brightness_stdev: f64,
    pub blur_variance: f64,
}

/// Loads the frame at `path`, measures the configured ROI, and leaves the
/// grayscale crop at `paths.output` for inspection.
pub fn extract(path: &Path, config: &MeterConfig) -> Result<MetricSample, MeterError> {
    let frame = load_frame(path, &config.frame)?;
    let gray = roi_luma(&frame, &config.roi);

    if let Some(output) = &config.paths.output {
        // Diagnostic only; the decision does not depend on it.
        if let Err(e) = gray.save(output) {
            tracing::warn!(path = %output.display(), error = %e, "could not write diagnostic roi crop");
        }
    }

    let sample = measure(&gray);
    tracing::debug!(
        brightness = sample.brightness,
        stdev = sample.brightness_stdev,
        blur = sample.blur_variance,
        "roi measured"
    );
    Ok(sample)
}

/// Computes the three metrics over an already cropped luma image.
pub fn measure(gray: &GrayImage) -> MetricSample {
    let (brightness, brightness_stdev) = mean_stdev(gray);
    MetricSample {
        brightness,
        brightness_stdev,
        blur_variance: laplacian_variance(gray),
    }
}

fn mean_stdev(gray: &GrayImage) -> (f64, f64) {
    let count = gray.width() as usize * gray.height() as usize;
    if count == 0 {
        return (0.0, 0.0);
    }
    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    for p in gray.pixels() {
        let v = p.0[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Variance of the Laplacian response over every pixel of `gray`.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let at = |x: i64, y: i64| -> f64 {
        let xr = reflect_101(x, width as i64);
        let yr = reflect_101(y, height as i64);
        gray.get_pixel(xr as u32, yr as u32).0[0] as f64
    };

    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let response = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }
    let count = (width as f64) * (height as f64);
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Mirrors an out-of-range index without repeating the edge pixel
/// (`-1 -> 1`, `len -> len - 2`). Single-pixel axes map everything to 0.
fn reflect_101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i.rem_euclid(period);
    if m < len { m } else { period - m }
}
