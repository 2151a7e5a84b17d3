//! Transport boundary for upstream HTTP I/O.
//!
//! Feeds are read with authenticated GETs and nothing else, so the boundary
//! is a single method taking a URL and an optional API key. [`ReqwestTransport`]
//! is the production implementation; tests script responses with the
//! in-memory `MockTransport`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Upstream request timeout. In-flight requests are allowed to run this long
/// during shutdown.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// One authenticated GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub url: String,
    /// Sent as [`API_KEY_HEADER`] when present.
    pub api_key: Option<String>,
}

/// Status and body of a completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no scripted response left for GET {url}")]
    NoMockResponse { url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: GetRequest) -> Result<RawResponse, HttpError>;
}

/// Transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tailsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout(e.to_string())
        } else {
            HttpError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: GetRequest) -> Result<RawResponse, HttpError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = request.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;

#[cfg(test)]
mod mock {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Script {
        outcomes: VecDeque<Result<RawResponse, String>>,
        requests: Vec<GetRequest>,
    }

    /// Answers requests from a FIFO script, whatever their URL.
    #[derive(Clone, Default)]
    pub(crate) struct MockTransport {
        script: Arc<Mutex<Script>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_response(&self, status: u16, body: &[u8]) {
            self.script
                .lock()
                .unwrap()
                .outcomes
                .push_back(Ok(RawResponse {
                    status,
                    body: body.to_vec(),
                }));
        }

        /// Script a transport failure (no response at all).
        pub fn push_failure(&self, message: &str) {
            self.script
                .lock()
                .unwrap()
                .outcomes
                .push_back(Err(message.to_string()));
        }

        pub fn requests(&self) -> Vec<GetRequest> {
            self.script.lock().unwrap().requests.clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(&self, request: GetRequest) -> Result<RawResponse, HttpError> {
            let mut script = self.script.lock().unwrap();
            let url = request.url.clone();
            script.requests.push(request);
            match script.outcomes.pop_front() {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(HttpError::Transport(message)),
                None => Err(HttpError::NoMockResponse { url }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> GetRequest {
        GetRequest {
            url: url.to_string(),
            api_key: None,
        }
    }

    #[test]
    fn success_is_2xx() {
        assert!(RawResponse::ok(Vec::new()).is_success());
        let throttled = RawResponse {
            status: 429,
            body: Vec::new(),
        };
        assert!(!throttled.is_success());
    }

    #[tokio::test]
    async fn mock_replays_script_in_order() {
        let transport = MockTransport::new();
        transport.push_response(500, b"boom");
        transport.push_failure("connection reset");
        transport.push_response(200, b"{}");

        let a = transport.get(get("https://x/a")).await.unwrap();
        assert_eq!((a.status, a.body.as_slice()), (500, b"boom".as_slice()));

        let err = transport.get(get("https://x/b")).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(m) if m == "connection reset"));

        assert!(transport.get(get("https://x/c")).await.unwrap().is_success());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn mock_errors_once_script_runs_out() {
        let transport = MockTransport::new();
        let err = transport.get(get("https://x/missing")).await.unwrap_err();
        assert!(matches!(err, HttpError::NoMockResponse { url } if url.ends_with("/missing")));
    }
}
