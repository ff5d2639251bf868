//! [`HttpClient`] backed by `reqwest`.
//!
//! Enabled with the `reqwest` feature.

use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpCloudHandler};
use std::time::Duration;

/// HTTP client using a shared `reqwest::Client` connection pool.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with reqwest's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Creates a client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<Vec<u8>, String> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| e.to_string())
    }
}

impl HttpCloudHandler<ReqwestClient> {
    /// Creates a handler for the authority at `base_url` using reqwest.
    pub fn with_reqwest(base_url: impl Into<String>) -> Self {
        Self::new(base_url, ReqwestClient::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CloudHandler, CloudRequest};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one request with `status` and `body`, returning what it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if request_complete(&received) {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        (url, handle)
    }

    fn request_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        received.len() >= header_end + 4 + length
    }

    #[tokio::test]
    async fn posts_to_dataset_url() {
        let (url, server) = serve_once("200 OK", r#"{"hash":"H1"}"#).await;
        let handler = HttpCloudHandler::with_reqwest(url).with_header("X-App", "todo");

        let answer = handler
            .send(CloudRequest {
                dataset_id: "todos".into(),
                payload: json!({"fn": "sync", "dataset_id": "todos"}),
            })
            .await
            .unwrap();
        assert_eq!(answer, json!({"hash": "H1"}));

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /mbaas/sync/todos HTTP/1.1"));
        assert!(received.to_ascii_lowercase().contains("x-app: todo"));
        assert!(received.contains(r#""fn":"sync""#));
    }

    #[tokio::test]
    async fn error_status_is_a_transport_failure() {
        let (url, server) = serve_once("500 Internal Server Error", "{}").await;
        let handler = HttpCloudHandler::new(
            url,
            ReqwestClient::with_timeout(Duration::from_secs(5)).unwrap(),
        );

        let err = handler
            .send(CloudRequest {
                dataset_id: "todos".into(),
                payload: json!({"fn": "sync"}),
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.reason().contains("500"));
        assert_eq!(handler.last_error().as_deref(), Some(err.reason().as_str()));
        server.await.unwrap();
    }
}
