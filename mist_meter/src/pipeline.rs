// THEORY:
// The `pipeline` module is the top-level API of the fog meter. One call to
// `MistPipeline::run` is one complete, run-to-completion inspection of the
// current webcam frame:
//
// Extractor -> Rule + Classifier (same sample) -> Fuser -> Annotator (only on
// alert) -> Dispatch.
//
// The run is linear and holds the single-instance lock from start to finish.
// Failure domains stay separate: an unreadable frame or an unwritable archive
// ends the run, a broken calibration set only switches the classifier off for
// this run, and sink failures are confined to the dispatcher's report.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::config::MeterConfig;
use crate::core_modules::annotator::annotate_at;
use crate::core_modules::classifier::calibration::load_calibration;
use crate::core_modules::classifier::{Prediction, classify_cached};
use crate::core_modules::fuser::{fuse, rule_only};
use crate::core_modules::metrics::extract;
use crate::core_modules::rule::apply_configured_rule;
use crate::dispatch::influx::InfluxSink;
use crate::dispatch::sheets::SheetsSink;
use crate::dispatch::signal::SignalSink;
use crate::dispatch::{
    DispatchReport, Dispatcher, MessagingSink, SpreadsheetSink, TimeSeriesSink, http_client,
};
use crate::error::MeterError;
use crate::lock::RunLock;

// Re-export key data structures for the public API.
pub use crate::core_modules::fuser::Decision;
pub use crate::core_modules::metrics::MetricSample;

/// Everything one run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub sample: MetricSample,
    pub decision: Decision,
    /// `None` when the classifier could not run; see `classifier_error`.
    pub prediction: Option<Prediction>,
    /// The annotated frame, present only when an alert was raised.
    pub artifact: Option<PathBuf>,
    pub report: DispatchReport,
    /// Calibration or fit failure that forced a rule-only decision.
    pub classifier_error: Option<MeterError>,
}

/// The pipeline wired to the production sinks.
pub type ProductionPipeline = MistPipeline<InfluxSink, SheetsSink, SignalSink>;

pub struct MistPipeline<T, S, M> {
    config: MeterConfig,
    dispatcher: Dispatcher<T, S, M>,
}

impl ProductionPipeline {
    pub fn from_config(config: MeterConfig) -> Result<Self, MeterError> {
        let client = http_client(&config.network)?;
        let dispatcher = Dispatcher::new(
            InfluxSink::new(client.clone(), config.influx.clone()),
            SheetsSink::new(client.clone(), config.sheets.clone()),
            SignalSink::new(client, config.signal.clone()),
            config.recipient_numbers(),
        );
        Ok(Self::new(config, dispatcher))
    }
}

impl<T, S, M> MistPipeline<T, S, M>
where
    T: TimeSeriesSink,
    S: SpreadsheetSink,
    M: MessagingSink,
{
    pub fn new(config: MeterConfig, dispatcher: Dispatcher<T, S, M>) -> Self {
        Self { config, dispatcher }
    }

    pub async fn run(&self) -> Result<RunOutcome, MeterError> {
        self.run_at(Local::now()).await
    }

    /// `run` with an explicit clock, which names the archive file and stamps
    /// the records.
    pub async fn run_at(&self, now: DateTime<Local>) -> Result<RunOutcome, MeterError> {
        let paths = &self.config.paths;

        // Stage 0: Single-instance guard, held until the run returns.
        let _lock = RunLock::acquire(
            &paths.lock_file,
            Duration::from_secs(self.config.lock.stale_after_secs),
        )?;

        // Stage 1: Metric extraction. Without a sample there is nothing to decide.
        let sample = extract(&paths.image, &self.config)?;

        // Stage 2: Threshold rule.
        let rule_triggered = apply_configured_rule(&sample, &self.config.threshold);
        tracing::debug!(rule_triggered, "threshold rule evaluated");

        // Stage 3: Classifier. Its failure degrades the run to rule-only.
        let (prediction, classifier_error) = match self.classify(&sample) {
            Ok(p) => (Some(p), None),
            Err(e) => {
                tracing::error!(error = %e, "classifier unavailable, deciding on the threshold rule alone");
                (None, Some(e))
            }
        };

        // Stage 4: Fusion.
        let decision = match &prediction {
            Some(p) => fuse(rule_triggered, p.label, p.probability, self.config.threshold.certainty_floor),
            None => rule_only(rule_triggered),
        };

        // Stage 5: Annotation, only for alerts.
        let artifact = if decision.should_alert {
            Some(annotate_at(&paths.image, &sample, &self.config, now)?)
        } else {
            None
        };

        // Stage 6: Dispatch. Per-sink failures end up in the report.
        let report = self
            .dispatcher
            .dispatch(&sample, &decision, artifact.as_deref(), now.timestamp())
            .await;

        tracing::info!(
            brightness = sample.brightness,
            blur = sample.blur_variance,
            should_alert = decision.should_alert,
            sink_failures = report.failures().count(),
            summary = %decision.message,
            "run complete"
        );

        Ok(RunOutcome {
            sample,
            decision,
            prediction,
            artifact,
            report,
            classifier_error,
        })
    }

    fn classify(&self, sample: &MetricSample) -> Result<Prediction, MeterError> {
        let set = load_calibration(&self.config.paths.calibration)?;
        Ok(classify_cached(
            sample,
            &set,
            &self.config.classifier,
            self.config.paths.model_cache.as_deref(),
        )?)
    }
}
