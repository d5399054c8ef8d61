use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;

use crate::error::Result;

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// `Retry-After` given as delta seconds.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }
}

/// Failures below HTTP: the request never produced a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout(String),
    Connection(String),
    InvalidRequest(String),
}

impl TransportFailure {
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportFailure::InvalidRequest(_))
    }

    pub fn message(&self) -> &str {
        match self {
            TransportFailure::Timeout(m)
            | TransportFailure::Connection(m)
            | TransportFailure::InvalidRequest(m) => m,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<TransportResponse, TransportFailure>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// `attempt_timeout` bounds a single request; the fetcher's deadline
    /// bounds the whole retry sequence.
    pub fn new(user_agent: &str, attempt_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(attempt_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> std::result::Result<TransportResponse, TransportFailure> {
        let resp = self.client.get(url).send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.map_err(classify)?;
        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout(err.to_string())
    } else if err.is_builder() {
        TransportFailure::InvalidRequest(err.to_string())
    } else {
        TransportFailure::Connection(err.to_string())
    }
}
