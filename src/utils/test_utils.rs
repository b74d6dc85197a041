use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::core::endpoint::Endpoint;
use crate::core::security_log::SecurityLog;
use crate::core::transport::OllamaClient;
use crate::core::validator::Validator;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub chunks: Vec<String>,
    pub chunk_delay: Duration,
    /// Keep the connection open this long after the last chunk.
    pub hold_open: Duration,
}

impl MockResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        MockResponse {
            status,
            content_type: "application/json",
            chunks: vec![body.into()],
            chunk_delay: Duration::ZERO,
            hold_open: Duration::ZERO,
        }
    }

    pub fn ndjson(lines: &[&str]) -> Self {
        MockResponse {
            status: 200,
            content_type: "application/x-ndjson",
            chunks: lines.iter().map(|line| format!("{line}\n")).collect(),
            chunk_delay: Duration::ZERO,
            hold_open: Duration::ZERO,
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn held_open(mut self, duration: Duration) -> Self {
        self.hold_open = duration;
        self
    }
}

/// Minimal HTTP/1.1 server answering every request through `handler` and
/// recording what it received.
pub struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handler = Arc::new(handler);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, handler.as_ref(), &recorded).await;
                });
            }
        });

        MockServer {
            base_url: format!("http://{addr}"),
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection<F>(
    mut stream: TcpStream,
    handler: &F,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> Result<(), String>
where
    F: Fn(&RecordedRequest) -> MockResponse,
{
    let request = read_http_request(&mut stream).await?;
    let response = handler(&request);
    recorded.lock().expect("requests lock").push(request);

    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
        response.status,
        if response.status < 400 { "OK" } else { "Error" },
        response.content_type
    );
    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|err| err.to_string())?;
    for chunk in &response.chunks {
        stream
            .write_all(chunk.as_bytes())
            .await
            .map_err(|err| err.to_string())?;
        stream.flush().await.map_err(|err| err.to_string())?;
        if !response.chunk_delay.is_zero() {
            tokio::time::sleep(response.chunk_delay).await;
        }
    }
    if !response.hold_open.is_zero() {
        tokio::time::sleep(response.hold_open).await;
    }
    stream.shutdown().await.map_err(|err| err.to_string())
}

async fn read_http_request(stream: &mut TcpStream) -> Result<RecordedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        if name.eq_ignore_ascii_case("content-length") {
            let value = parts.next().unwrap_or_default().trim();
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length.saturating_sub(body.len())];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(RecordedRequest { method, path, body })
}

/// Validator rooted at `root` with its security log under `root/logs`.
pub fn test_validator(root: &std::path::Path) -> Arc<Validator> {
    let log = SecurityLog::new(root.join("logs").join("security.log"));
    Arc::new(Validator::new(root.to_path_buf(), log))
}

/// Client pointed at `base_url` that ignores proxy settings from the
/// environment.
pub fn test_client(base_url: &str, validator: Arc<Validator>) -> OllamaClient {
    let endpoint = Endpoint::parse(base_url, &validator).expect("mock endpoint is valid");
    let http = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client should build");
    OllamaClient::with_http_client(http, endpoint, validator)
}
