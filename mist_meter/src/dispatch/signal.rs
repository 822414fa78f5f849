// Messaging through a signal-cli daemon's JSON-RPC HTTP endpoint. The daemon
// answers 200 even when it refuses a send, so the reply body is checked for
// an `error` member.

use std::path::PathBuf;

use reqwest::Client;
use serde_json::{Value, json};

use super::{MessagingSink, send_checked};
use crate::config::SignalConfig;
use crate::error::SinkDispatchError;

const SINK: &str = "signal";

pub struct SignalSink {
    client: Client,
    config: SignalConfig,
}

impl SignalSink {
    pub fn new(client: Client, config: SignalConfig) -> Self {
        Self { client, config }
    }
}

impl MessagingSink for SignalSink {
    async fn send_message(
        &self,
        text: &str,
        attachments: &[PathBuf],
        recipients: &[String],
    ) -> Result<(), SinkDispatchError> {
        let payload = request_body(text, attachments, recipients, self.config.account.as_deref());
        let body = send_checked(SINK, self.client.post(&self.config.url).json(&payload)).await?;
        check_reply(&body)?;
        tracing::info!(recipients = recipients.len(), "alert message sent");
        Ok(())
    }
}

pub fn request_body(text: &str, attachments: &[PathBuf], recipients: &[String], account: Option<&str>) -> Value {
    let attachments: Vec<String> = attachments.iter().map(|p| p.display().to_string()).collect();
    let mut params = json!({
        "recipient": recipients,
        "message": text,
        "attachments": attachments,
    });
    if let Some(account) = account {
        params["account"] = json!(account);
    }
    json!({
        "jsonrpc": "2.0",
        "method": "send",
        "id": "mist_meter",
        "params": params,
    })
}

pub fn check_reply(body: &str) -> Result<(), SinkDispatchError> {
    let reply: Value = serde_json::from_str(body).map_err(|e| SinkDispatchError::Response {
        sink: SINK,
        detail: format!("{e}: {body}"),
    })?;
    match reply.get("error") {
        Some(error) => Err(SinkDispatchError::Response {
            sink: SINK,
            detail: error.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::test_server::{self, Reply};

    #[test]
    fn send_request_lists_recipients_and_attachment() {
        let body = request_body(
            "Classifier predicts mist with probability 0.81",
            &[PathBuf::from("/archive/2021-02-13_0830.png")],
            &["+31600000001".to_string(), "+31600000002".to_string()],
            None,
        );
        assert_eq!(body["method"], "send");
        assert_eq!(body["params"]["recipient"][1], "+31600000002");
        assert_eq!(body["params"]["attachments"][0], "/archive/2021-02-13_0830.png");
        assert!(body["params"].get("account").is_none());
    }

    #[test]
    fn account_is_passed_through() {
        let body = request_body("hi", &[], &["+31600000001".to_string()], Some("+31699999999"));
        assert_eq!(body["params"]["account"], "+31699999999");
        assert_eq!(body["params"]["attachments"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn error_member_means_rejected() {
        assert!(check_reply(r#"{"jsonrpc":"2.0","result":{"timestamp":1},"id":"mist_meter"}"#).is_ok());
        let err = check_reply(r#"{"jsonrpc":"2.0","error":{"code":-1,"message":"Unregistered user"},"id":"mist_meter"}"#)
            .unwrap_err();
        assert_eq!(err.sink(), "signal");
        assert!(err.to_string().contains("Unregistered user"));
    }

    #[tokio::test]
    async fn send_posts_json_rpc_to_the_daemon() {
        let (url, server) =
            test_server::serve_once(Reply::Status(200, r#"{"jsonrpc":"2.0","result":{"timestamp":1},"id":"mist_meter"}"#)).await;
        let sink = SignalSink::new(
            test_server::client(5),
            SignalConfig {
                url: format!("{url}/api/v1/rpc"),
                account: None,
            },
        );
        let attachment = PathBuf::from("/archive/2021-02-13_0830.png");
        sink.send_message("mist", std::slice::from_ref(&attachment), &["+31600000001".to_string()])
            .await
            .expect("sent");

        let request = server.await.expect("server");
        assert_eq!(request.request_line(), "POST /api/v1/rpc HTTP/1.1");
        assert_eq!(request.header("content-type"), Some("application/json"));
        let payload: Value = serde_json::from_str(&request.body).expect("json body");
        assert_eq!(payload, request_body("mist", &[attachment], &["+31600000001".to_string()], None));
    }

    #[tokio::test]
    async fn daemon_error_reply_fails_the_send() {
        let (url, _server) = test_server::serve_once(Reply::Status(
            200,
            r#"{"jsonrpc":"2.0","error":{"code":-1,"message":"Unregistered user"},"id":"mist_meter"}"#,
        ))
        .await;
        let sink = SignalSink::new(test_server::client(5), SignalConfig { url, account: None });
        let err = sink.send_message("mist", &[], &["+31600000001".to_string()]).await.unwrap_err();
        assert!(matches!(err, SinkDispatchError::Response { sink: "signal", .. }));
    }
}
