// A one-request HTTP/1.1 server on a loopback port, for exercising the real
// sinks over a socket. It records the request it receives and answers with a
// canned status, or never answers at all.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;

pub(crate) enum Reply {
    Status(u16, &'static str),
    Silent,
}

/// The request as it arrived: head (request line plus headers) and body.
#[derive(Debug)]
pub(crate) struct Received {
    pub head: String,
    pub body: String,
}

impl Received {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Binds a free port and serves exactly one request. Returns the base url
/// and the task that yields what was received.
pub(crate) async fn serve_once(reply: Reply) -> (String, JoinHandle<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let received = read_request(&mut socket).await;
        match reply {
            Reply::Status(status, body) => {
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.expect("write reply");
                socket.shutdown().await.ok();
            }
            Reply::Silent => tokio::time::sleep(Duration::from_secs(30)).await,
        }
        received
    });
    (url, task)
}

/// A loopback url nothing listens on.
pub(crate) async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    drop(listener);
    url
}

pub(crate) fn client(timeout_secs: u64) -> reqwest::Client {
    super::http_client(&NetworkConfig { timeout_secs }).expect("client")
}

async fn read_request(socket: &mut TcpStream) -> Received {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            let length = content_length(&head);
            if buf.len() >= end + 4 + length {
                let body = String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).into_owned();
                return Received { head, body };
            }
        }
        let n = socket.read(&mut chunk).await.expect("read request");
        assert!(n > 0, "client closed before the request was complete");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}
