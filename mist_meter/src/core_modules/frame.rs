// THEORY:
// A frame is the latest camera image, decoded to 8-bit RGB and normalized to
// the configured target resolution. The ROI is defined in target coordinates,
// so anything that crops or draws must go through `load_frame` first. The
// extractor and the annotator each call it on their own; neither hands a
// decoded frame to the other.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

use crate::config::{FrameConfig, Roi};
use crate::error::MeterError;

/// Decodes the image at `path` and resamples it to `target` if needed.
pub fn load_frame(path: &Path, target: &FrameConfig) -> Result<RgbImage, MeterError> {
    let decoded = image::open(path).map_err(|source| MeterError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = decoded.to_rgb8();
    tracing::debug!(path = %path.display(), width = rgb.width(), height = rgb.height(), "frame decoded");
    Ok(normalize(rgb, target))
}

/// Resamples to the target resolution with a cubic filter. Frames already at
/// the target size pass through untouched.
pub fn normalize(rgb: RgbImage, target: &FrameConfig) -> RgbImage {
    if rgb.dimensions() == (target.width, target.height) {
        return rgb;
    }
    tracing::debug!(
        from_width = rgb.width(),
        from_height = rgb.height(),
        to_width = target.width,
        to_height = target.height,
        "resampling frame"
    );
    imageops::resize(&rgb, target.width, target.height, FilterType::CatmullRom)
}

/// Crops the ROI and converts it to single-channel Rec. 601 luma.
pub fn roi_luma(frame: &RgbImage, roi: &Roi) -> GrayImage {
    let crop = imageops::crop_imm(frame, roi.x1, roi.y1, roi.width(), roi.height()).to_image();
    GrayImage::from_fn(crop.width(), crop.height(), |x, y| {
        let [r, g, b] = crop.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    })
}

/// Perceived brightness of one RGB pixel, rounded to the nearest level.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299_f64 * r as f64 + 0.587_f64 * g as f64 + 0.114_f64 * b as f64;
    y.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn luma_weights_green_heaviest() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn normalize_resamples_to_target() {
        let target = FrameConfig { width: 64, height: 36 };
        let small = RgbImage::from_pixel(20, 10, Rgb([10, 20, 30]));
        let out = normalize(small, &target);
        assert_eq!(out.dimensions(), (64, 36));
    }

    #[test]
    fn normalize_keeps_frames_at_target_size() {
        let target = FrameConfig { width: 8, height: 4 };
        let frame = RgbImage::from_fn(8, 4, |x, y| Rgb([x as u8, y as u8, 0]));
        let out = normalize(frame.clone(), &target);
        assert_eq!(out, frame);
    }

    #[test]
    fn roi_luma_crops_to_region() {
        let frame = RgbImage::from_fn(10, 10, |x, _| if x < 5 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let roi = Roi::new(5, 2, 9, 6);
        let gray = roi_luma(&frame, &roi);
        assert_eq!(gray.dimensions(), (4, 4));
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn missing_file_is_an_image_load_error() {
        let target = FrameConfig::default();
        let err = load_frame(Path::new("/nonexistent/frame.jpg"), &target).unwrap_err();
        assert!(matches!(err, MeterError::ImageLoad { .. }));
    }
}
