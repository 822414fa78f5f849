// InfluxDB 1.x `/write` endpoint, one line-protocol record per run.
// Classifier fields are left out of the line when the classifier did not run.

use reqwest::Client;

use super::{Measurement, TimeSeriesSink, send_checked};
use crate::config::InfluxConfig;
use crate::error::SinkDispatchError;

const SINK: &str = "influx";

pub struct InfluxSink {
    client: Client,
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(client: Client, config: InfluxConfig) -> Self {
        Self { client, config }
    }
}

impl TimeSeriesSink for InfluxSink {
    async fn write_measurement(&self, measurement: &Measurement) -> Result<(), SinkDispatchError> {
        let url = format!("{}/write", self.config.url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(url)
            .query(&[("db", self.config.database.as_str()), ("precision", "s")])
            .body(line(&self.config.source, measurement));
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_ref());
        }
        send_checked(SINK, request).await?;
        tracing::debug!(database = %self.config.database, "measurement written");
        Ok(())
    }
}

/// `<source> brightness=..,stdev=..,blur=..[,mist=0|1][,probability=..] <unix seconds>`
pub fn line(source: &str, m: &Measurement) -> String {
    let mut fields = format!("brightness={},stdev={},blur={}", m.brightness, m.stdev, m.blur);
    if let Some(mist) = m.mist {
        fields.push_str(&format!(",mist={}", u8::from(mist)));
    }
    if let Some(p) = m.probability {
        fields.push_str(&format!(",probability={p}"));
    }
    format!("{} {} {}", escape_measurement(source), fields, m.timestamp)
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}
