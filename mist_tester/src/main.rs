// Batch calibration tool. Measures every frame in a directory the same way a
// live run does, saves an annotated copy for eyeballing the ROI and thresholds,
// and can append the measurements as labeled rows to a calibration file.
// It never talks to any sink.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::Level;

use mist_meter::MeterConfig;
use mist_meter::core_modules::annotator::draw_overlay;
use mist_meter::core_modules::frame::{load_frame, roi_luma};
use mist_meter::core_modules::metrics::{MetricSample, measure};

#[derive(Debug, Parser)]
#[command(name = "mist_tester", version, about = "Measure archived frames and build calibration rows")]
struct Cli {
    /// Directory with jpg/jpeg/png frames.
    input_dir: PathBuf,
    /// Where annotated copies are written.
    output_dir: PathBuf,
    /// Label for every frame in the batch.
    #[arg(long, value_enum)]
    label: Option<Label>,
    /// Calibration CSV to append `blur,brightness,mist` rows to.
    #[arg(long, requires = "label")]
    csv: Option<PathBuf>,
    /// Config file; defaults to `$MIST_METER_CONFIG` or the system path.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Label {
    Mist,
    Clear,
}

impl Label {
    fn flag(self) -> &'static str {
        match self {
            Label::Mist => "1",
            Label::Clear => "0",
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    processed: usize,
    skipped: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => MeterConfig::from_path(path),
        None => MeterConfig::load(),
    }
    .context("loading configuration")?;

    let rows = match (&cli.csv, cli.label) {
        (Some(path), Some(label)) => Some((path.as_path(), label)),
        _ => None,
    };
    let summary = process(&cli.input_dir, &cli.output_dir, &config, rows)?;
    println!(
        "Processing complete: {} frames measured, {} skipped. Output saved to {}",
        summary.processed,
        summary.skipped,
        cli.output_dir.display()
    );
    Ok(())
}

fn process(input: &Path, output: &Path, config: &MeterConfig, rows: Option<(&Path, Label)>) -> anyhow::Result<Summary> {
    fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;
    let mut rows = rows
        .map(|(path, label)| CalibrationWriter::open(path).map(|writer| (writer, label)))
        .transpose()?;

    let mut summary = Summary::default();
    for image_path in list_images(input)? {
        let mut frame = match load_frame(&image_path, &config.frame) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "skipping frame");
                summary.skipped += 1;
                continue;
            }
        };
        let sample = measure(&roi_luma(&frame, &config.roi));
        draw_overlay(&mut frame, &config.roi, &sample)?;

        let stem = image_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let target = output.join(format!("{stem}.png"));
        frame.save(&target).with_context(|| format!("writing {}", target.display()))?;

        if let Some((writer, label)) = rows.as_mut() {
            writer.append(&sample, *label)?;
        }
        println!(
            "{}: blur {:.0} brightness {:.0} stdev {:.1}",
            image_path.display(),
            sample.blur_variance,
            sample.brightness,
            sample.brightness_stdev
        );
        summary.processed += 1;
    }

    if let Some((writer, _)) = rows.as_mut() {
        writer.flush()?;
    }
    Ok(summary)
}

fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    images.sort();
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|e| matches!(e.as_str(), "jpg" | "jpeg" | "png"))
}

/// Appends rows in the format `load_calibration` reads back.
struct CalibrationWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CalibrationWriter {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(["blur", "brightness", "mist"])?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    fn append(&mut self, sample: &MetricSample, label: Label) -> anyhow::Result<()> {
        self.writer
            .write_record([
                sample.blur_variance.to_string(),
                sample.brightness.to_string(),
                label.flag().to_string(),
            ])
            .with_context(|| format!("appending to {}", self.path.display()))
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush().with_context(|| format!("flushing {}", self.path.display()))
    }
}
