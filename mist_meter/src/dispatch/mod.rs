// THEORY:
// Dispatch fans one run's result out to three independent sinks:
// 1.  **Time series**: one line-protocol record per run.
// 2.  **Spreadsheet**: one form post per run, checked for a success flag.
// 3.  **Messaging**: the alert text and annotated frame, only when the
//     decision asks for an alert.
//
// Each sink is attempted exactly once and its outcome is kept apart from the
// others: a failure is logged and recorded in the `DispatchReport`, and the
// next sink runs regardless. Nothing here is fatal to the run.
//
// The sinks sit behind small traits so the dispatcher can be driven by
// in-memory doubles in tests.

pub mod influx;
pub mod sheets;
pub mod signal;
#[cfg(test)]
mod test_server;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::core_modules::fuser::Decision;
use crate::core_modules::metrics::MetricSample;
use crate::error::{MeterError, SinkDispatchError};

/// One client for all sinks, so every request shares the configured timeout.
pub fn http_client(network: &NetworkConfig) -> Result<reqwest::Client, MeterError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(network.timeout_secs))
        .user_agent(concat!("mist_meter/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(MeterError::HttpClient)
}

/// Sends `request` and returns the response body when the status is a success.
pub(crate) async fn send_checked(sink: &'static str, request: reqwest::RequestBuilder) -> Result<String, SinkDispatchError> {
    let response = request
        .send()
        .await
        .map_err(|source| SinkDispatchError::Transport { sink, source })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| SinkDispatchError::Transport { sink, source })?;
    if !status.is_success() {
        return Err(SinkDispatchError::Rejected {
            sink,
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// The flat record the time-series and spreadsheet sinks receive.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub brightness: f64,
    pub stdev: f64,
    pub blur: f64,
    pub mist: Option<bool>,
    pub probability: Option<f64>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl Measurement {
    pub fn new(sample: &MetricSample, decision: &Decision, timestamp: i64) -> Self {
        Self {
            brightness: sample.brightness,
            stdev: sample.brightness_stdev,
            blur: sample.blur_variance,
            mist: decision.predicted_label,
            probability: decision.probability,
            timestamp,
        }
    }
}

pub trait TimeSeriesSink {
    fn write_measurement(&self, measurement: &Measurement) -> impl Future<Output = Result<(), SinkDispatchError>> + Send;
}

pub trait SpreadsheetSink {
    fn append_row(&self, measurement: &Measurement) -> impl Future<Output = Result<(), SinkDispatchError>> + Send;
}

pub trait MessagingSink {
    fn send_message(
        &self,
        text: &str,
        attachments: &[PathBuf],
        recipients: &[String],
    ) -> impl Future<Output = Result<(), SinkDispatchError>> + Send;
}

/// What happened at each sink. `messaging` is `None` when no alert was sent.
#[derive(Debug)]
pub struct DispatchReport {
    pub timeseries: Result<(), SinkDispatchError>,
    pub spreadsheet: Result<(), SinkDispatchError>,
    pub messaging: Option<Result<(), SinkDispatchError>>,
}

impl DispatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &SinkDispatchError> {
        [
            self.timeseries.as_ref().err(),
            self.spreadsheet.as_ref().err(),
            self.messaging.as_ref().and_then(|r| r.as_ref().err()),
        ]
        .into_iter()
        .flatten()
    }

    pub fn all_ok(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Dispatcher<T, S, M> {
    timeseries: T,
    spreadsheet: S,
    messenger: M,
    recipients: Vec<String>,
}

impl<T, S, M> Dispatcher<T, S, M>
where
    T: TimeSeriesSink,
    S: SpreadsheetSink,
    M: MessagingSink,
{
    pub fn new(timeseries: T, spreadsheet: S, messenger: M, recipients: Vec<String>) -> Self {
        Self {
            timeseries,
            spreadsheet,
            messenger,
            recipients,
        }
    }

    pub async fn dispatch(
        &self,
        sample: &MetricSample,
        decision: &Decision,
        artifact: Option<&Path>,
        timestamp: i64,
    ) -> DispatchReport {
        let measurement = Measurement::new(sample, decision, timestamp);

        let timeseries = logged(self.timeseries.write_measurement(&measurement).await);
        let spreadsheet = logged(self.spreadsheet.append_row(&measurement).await);

        let messaging = if !decision.should_alert {
            None
        } else if self.recipients.is_empty() {
            tracing::warn!("alert raised but no recipients are configured");
            None
        } else {
            let attachments: Vec<PathBuf> = artifact.map(Path::to_path_buf).into_iter().collect();
            Some(logged(
                self.messenger
                    .send_message(&decision.message, &attachments, &self.recipients)
                    .await,
            ))
        };

        DispatchReport {
            timeseries,
            spreadsheet,
            messaging,
        }
    }
}

fn logged(result: Result<(), SinkDispatchError>) -> Result<(), SinkDispatchError> {
    match &result {
        Ok(()) => {}
        Err(e) => tracing::error!(sink = e.sink(), error = %e, "sink dispatch failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::fuser::{fuse, rule_only};
    use std::sync::Mutex;

    /// Records every call; fails when `fail` is set.
    #[derive(Default)]
    struct Recorder {
        fail: bool,
        measurements: Mutex<Vec<Measurement>>,
        messages: Mutex<Vec<(String, Vec<PathBuf>, Vec<String>)>>,
    }

    impl Recorder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn outcome(&self, sink: &'static str) -> Result<(), SinkDispatchError> {
            if self.fail {
                Err(SinkDispatchError::Response {
                    sink,
                    detail: "simulated network error".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl TimeSeriesSink for &Recorder {
        async fn write_measurement(&self, measurement: &Measurement) -> Result<(), SinkDispatchError> {
            self.measurements.lock().expect("lock").push(measurement.clone());
            self.outcome("influx")
        }
    }

    impl SpreadsheetSink for &Recorder {
        async fn append_row(&self, measurement: &Measurement) -> Result<(), SinkDispatchError> {
            self.measurements.lock().expect("lock").push(measurement.clone());
            self.outcome("sheets")
        }
    }

    impl MessagingSink for &Recorder {
        async fn send_message(
            &self,
            text: &str,
            attachments: &[PathBuf],
            recipients: &[String],
        ) -> Result<(), SinkDispatchError> {
            self.messages
                .lock()
                .expect("lock")
                .push((text.to_string(), attachments.to_vec(), recipients.to_vec()));
            self.outcome("signal")
        }
    }

    fn sample() -> MetricSample {
        MetricSample {
            brightness: 120.0,
            brightness_stdev: 25.0,
            blur_variance: 40.0,
        }
    }

    fn recipients() -> Vec<String> {
        vec!["+31600000001".into(), "+31600000002".into()]
    }

    #[tokio::test]
    async fn spreadsheet_failure_does_not_stop_the_other_sinks() {
        let (influx, sheets, signal) = (Recorder::default(), Recorder::failing(), Recorder::default());
        let dispatcher = Dispatcher::new(&influx, &sheets, &signal, recipients());
        let decision = fuse(true, true, 0.9, 0.3);
        let artifact = PathBuf::from("/archive/2021-02-13_0830.png");

        let report = dispatcher.dispatch(&sample(), &decision, Some(&artifact), 1_613_200_000).await;

        assert!(report.timeseries.is_ok());
        assert!(report.spreadsheet.is_err());
        assert!(matches!(report.messaging, Some(Ok(()))));
        assert_eq!(report.failures().count(), 1);
        assert_eq!(influx.measurements.lock().unwrap().len(), 1);
        let sent = signal.messages.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, decision.message);
        assert_eq!(sent[0].1, vec![artifact.clone()]);
        assert_eq!(sent[0].2, recipients());
    }

    #[tokio::test]
    async fn every_sink_is_tried_even_when_all_fail() {
        let (influx, sheets, signal) = (Recorder::failing(), Recorder::failing(), Recorder::failing());
        let dispatcher = Dispatcher::new(&influx, &sheets, &signal, recipients());
        let report = dispatcher.dispatch(&sample(), &fuse(true, true, 0.9, 0.3), None, 0).await;
        assert_eq!(report.failures().count(), 3);
        assert_eq!(influx.measurements.lock().unwrap().len(), 1);
        assert_eq!(sheets.measurements.lock().unwrap().len(), 1);
        assert_eq!(signal.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_message_without_an_alert() {
        let (influx, sheets, signal) = (Recorder::default(), Recorder::default(), Recorder::default());
        let dispatcher = Dispatcher::new(&influx, &sheets, &signal, recipients());
        let report = dispatcher.dispatch(&sample(), &fuse(false, false, 0.95, 0.3), None, 0).await;
        assert!(report.all_ok());
        assert!(report.messaging.is_none());
        assert!(signal.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn measurement_carries_classifier_fields_when_present() {
        let (influx, sheets, signal) = (Recorder::default(), Recorder::default(), Recorder::default());
        let dispatcher = Dispatcher::new(&influx, &sheets, &signal, recipients());
        dispatcher.dispatch(&sample(), &fuse(false, true, 0.8, 0.3), None, 42).await;
        dispatcher.dispatch(&sample(), &rule_only(false), None, 43).await;

        let rows = influx.measurements.lock().unwrap();
        assert_eq!(rows[0].mist, Some(true));
        assert_eq!(rows[0].probability, Some(0.8));
        assert_eq!(rows[0].timestamp, 42);
        assert_eq!(rows[1].mist, None);
        assert_eq!(rows[1].probability, None);
    }

    #[tokio::test]
    async fn success_status_returns_the_body() {
        let (url, server) = test_server::serve_once(test_server::Reply::Status(200, r#"{"ok":true}"#)).await;
        let body = send_checked("influx", test_server::client(5).post(url).body("x")).await.expect("sent");
        assert_eq!(body, r#"{"ok":true}"#);
        assert_eq!(server.await.expect("server").body, "x");
    }

    #[tokio::test]
    async fn server_error_status_is_rejected_with_its_body() {
        let (url, _server) = test_server::serve_once(test_server::Reply::Status(500, "database not found")).await;
        let err = send_checked("influx", test_server::client(5).post(url)).await.unwrap_err();
        match err {
            SinkDispatchError::Rejected { sink, status, body } => {
                assert_eq!(sink, "influx");
                assert_eq!(status, 500);
                assert_eq!(body, "database not found");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let url = test_server::closed_url().await;
        let err = send_checked("sheets", test_server::client(5).post(url)).await.unwrap_err();
        assert!(matches!(&err, SinkDispatchError::Transport { source, .. } if source.is_connect()), "{err:?}");
        assert_eq!(err.sink(), "sheets");
    }

    #[tokio::test]
    async fn silent_server_hits_the_configured_timeout() {
        let (url, server) = test_server::serve_once(test_server::Reply::Silent).await;
        let started = std::time::Instant::now();
        let err = send_checked("signal", test_server::client(1).post(url)).await.unwrap_err();
        assert!(matches!(&err, SinkDispatchError::Transport { source, .. } if source.is_timeout()), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }

    #[tokio::test]
    async fn alert_without_recipients_is_skipped() {
        let (influx, sheets, signal) = (Recorder::default(), Recorder::default(), Recorder::default());
        let dispatcher = Dispatcher::new(&influx, &sheets, &signal, Vec::new());
        let report = dispatcher.dispatch(&sample(), &fuse(true, true, 0.9, 0.3), None, 0).await;
        assert!(report.messaging.is_none());
        assert!(signal.messages.lock().unwrap().is_empty());
    }
}
