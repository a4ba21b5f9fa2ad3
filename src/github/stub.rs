//! Stub GitHub API for tests: answers every connection with one canned
//! response and records the raw request head.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::GitHubClient;

pub(crate) struct Stub {
    pub base: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl Stub {
    pub fn last_request(&self) -> String {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub fn client(&self, token: Option<&str>) -> GitHubClient {
        GitHubClient::new(&self.base, token.map(String::from), Duration::from_secs(5)).unwrap()
    }
}

pub(crate) async fn stub(status: u16, content_type: &'static str, body: impl Into<String>) -> Stub {
    stub_delayed(status, content_type, body, None).await
}

pub(crate) async fn stub_delayed(
    status: u16,
    content_type: &'static str,
    body: impl Into<String>,
    delay: Option<Duration>,
) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    let body: Arc<str> = body.into().into();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = seen.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&chunk[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).into_owned());

                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }

                let response = format!(
                    "HTTP/1.1 {} Stub\r\n\
                     Content-Type: {}\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     \r\n\
                     {}",
                    status,
                    content_type,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    Stub {
        base: format!("http://{}", addr),
        requests,
    }
}
