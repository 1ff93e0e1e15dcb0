use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Status(u16),
    Decode,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Connect => write!(f, "connection error"),
            TransportErrorKind::Status(code) => write!(f, "HTTP {}", code),
            TransportErrorKind::Decode => write!(f, "invalid response body"),
            TransportErrorKind::Other => write!(f, "request error"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Timeouts, connection failures, 5xx and 429 may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            TransportErrorKind::Timeout | TransportErrorKind::Connect => true,
            TransportErrorKind::Status(code) => code >= 500 || code == 429,
            TransportErrorKind::Decode | TransportErrorKind::Other => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_decode() {
            TransportErrorKind::Decode
        } else if let Some(status) = error.status() {
            TransportErrorKind::Status(status.as_u16())
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, error.to_string())
    }
}

/// One GET returning a JSON document.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> std::result::Result<Value, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aq-forecast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonTransport for ReqwestTransport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> std::result::Result<Value, TransportError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(TransportError::new(
                TransportErrorKind::Status(status.as_u16()),
                snippet,
            ));
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Replays queued responses in order and records every request.
/// Used for offline runs and tests.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<std::result::Result<Value, TransportError>>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: std::result::Result<Value, TransportError>) -> &Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
        self
    }

    pub fn push_json(&self, body: Value) -> &Self {
        self.push(Ok(body))
    }

    /// Requests seen so far as (url, query) pairs.
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JsonTransport for ScriptedTransport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> std::result::Result<Value, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((url.to_string(), query.to_vec()));
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(TransportError::new(
                    TransportErrorKind::Other,
                    format!("no scripted response left for {}", url),
                ))
            })
    }
}
