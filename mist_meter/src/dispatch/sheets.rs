// Spreadsheet web-app sink. The app takes a url-encoded form and answers with
// a small JSON object whose `result` is "success" when the row was appended.

use reqwest::Client;
use serde::Deserialize;

use super::{Measurement, SpreadsheetSink, send_checked};
use crate::config::SheetsConfig;
use crate::error::SinkDispatchError;

const SINK: &str = "sheets";
const ACTION: &str = "mistmeter";

pub struct SheetsSink {
    client: Client,
    config: SheetsConfig,
}

impl SheetsSink {
    pub fn new(client: Client, config: SheetsConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Debug, Deserialize)]
struct SheetReply {
    result: String,
}

impl SpreadsheetSink for SheetsSink {
    async fn append_row(&self, measurement: &Measurement) -> Result<(), SinkDispatchError> {
        let request = self.client.post(&self.config.url).form(&form_fields(measurement));
        let body = send_checked(SINK, request).await?;
        check_reply(&body)?;
        tracing::debug!("spreadsheet row appended");
        Ok(())
    }
}

pub fn form_fields(m: &Measurement) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("action", ACTION.to_string()),
        ("blur", m.blur.to_string()),
        ("brightness", m.brightness.to_string()),
        ("timestamp", m.timestamp.to_string()),
    ];
    if let Some(mist) = m.mist {
        fields.push(("mist", u8::from(mist).to_string()));
    }
    if let Some(p) = m.probability {
        fields.push(("probability", p.to_string()));
    }
    fields
}

pub fn check_reply(body: &str) -> Result<(), SinkDispatchError> {
    let reply: SheetReply = serde_json::from_str(body).map_err(|e| SinkDispatchError::Response {
        sink: SINK,
        detail: format!("{e}: {body}"),
    })?;
    if reply.result == "success" {
        Ok(())
    } else {
        Err(SinkDispatchError::Response {
            sink: SINK,
            detail: format!("result was {:?}", reply.result),
        })
    }
}
