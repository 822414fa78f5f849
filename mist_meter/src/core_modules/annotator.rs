// THEORY:
// The annotator produces the picture a human sees: the current frame with the
// ROI outlined and the measured values printed on it. It reloads the frame
// from disk instead of borrowing the extractor's copy, so measurement and
// presentation stay independent and each reports its own load errors.
//
// Output goes to the alert archive under a minute-resolution timestamp; two
// alerts in the same minute share a file and the later one wins.

use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::config::{MeterConfig, Roi};
use crate::core_modules::frame::load_frame;
use crate::core_modules::metrics::MetricSample;
use crate::error::MeterError;

pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M";

const ROI_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 250]);
const TEXT_X: i32 = 50;
const TEXT_BASELINE: f32 = 150.0;
const TEXT_SCALE: PxScale = PxScale { x: 32.0, y: 32.0 };

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

fn overlay_font() -> Result<FontRef<'static>, MeterError> {
    Ok(FontRef::try_from_slice(FONT_DATA)?)
}

/// Draws the overlay for `sample` onto a fresh copy of the frame and archives it.
pub fn annotate(frame_path: &Path, sample: &MetricSample, config: &MeterConfig) -> Result<PathBuf, MeterError> {
    annotate_at(frame_path, sample, config, Local::now())
}

pub fn annotate_at(
    frame_path: &Path,
    sample: &MetricSample,
    config: &MeterConfig,
    now: DateTime<Local>,
) -> Result<PathBuf, MeterError> {
    let mut frame = load_frame(frame_path, &config.frame)?;
    draw_overlay(&mut frame, &config.roi, sample)?;

    let target = archive_path(&config.paths.fog_folder, now);
    std::fs::create_dir_all(&config.paths.fog_folder).map_err(|e| MeterError::ImageWrite {
        path: target.clone(),
        source: image::ImageError::IoError(e),
    })?;
    frame.save(&target).map_err(|source| MeterError::ImageWrite {
        path: target.clone(),
        source,
    })?;
    tracing::debug!(path = %target.display(), "annotated frame archived");
    Ok(target)
}

/// ROI outline plus the blur/brightness caption, whose baseline sits at y=150.
pub fn draw_overlay(frame: &mut RgbImage, roi: &Roi, sample: &MetricSample) -> Result<(), MeterError> {
    let outline = Rect::at(roi.x1 as i32, roi.y1 as i32).of_size(roi.width(), roi.height());
    draw_hollow_rect_mut(frame, outline, ROI_COLOR);

    let font = overlay_font()?;
    // draw_text_mut places the top of the line box at `y`.
    let top = (TEXT_BASELINE - font.as_scaled(TEXT_SCALE).ascent()).round() as i32;
    draw_text_mut(frame, TEXT_COLOR, TEXT_X, top, TEXT_SCALE, &font, &caption(sample));
    Ok(())
}

pub fn caption(sample: &MetricSample) -> String {
    format!("Blur: {:.0} Brightness: {:.0}", sample.blur_variance, sample.brightness)
}

pub fn archive_path(fog_folder: &Path, now: DateTime<Local>) -> PathBuf {
    fog_folder.join(format!("{}.png", now.format(ARCHIVE_TIMESTAMP_FORMAT)))
}
