use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tsbib_core::{FetchConfig, SourceConfig};

use super::retry::{Outcome, RetryPolicy, RetryState, Step};
use super::transport::{ReqwestTransport, Transport, TransportResponse};
use crate::error::{FetchError, FetchErrorKind, Result};

/// Response body of a successful fetch, tagged with where and when it came
/// from.
#[derive(Debug, Clone, Serialize)]
pub struct RawPayload {
    pub endpoint: String,
    pub url: String,
    pub status: u16,
    pub body: String,
    pub retrieved_at: DateTime<Utc>,
    pub attempts: u32,
}

impl RawPayload {
    pub fn new(endpoint: impl Into<String>, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            url: url.into(),
            status: 200,
            body: body.into(),
            retrieved_at: Utc::now(),
            attempts: 1,
        }
    }
}

/// Minimum spacing between requests to one endpoint, shared by every caller.
struct RateGate {
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct Fetcher<T: Transport = ReqwestTransport> {
    transport: T,
    policy: RetryPolicy,
    deadline: Duration,
    gates: Mutex<HashMap<String, Arc<RateGate>>>,
}

impl Fetcher<ReqwestTransport> {
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        let deadline = Duration::from_secs(config.deadline_secs);
        let transport = ReqwestTransport::new(&config.user_agent, deadline)?;
        Ok(Self::new(transport, RetryPolicy::from_config(config), deadline))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy, deadline: Duration) -> Self {
        Self {
            transport,
            policy,
            deadline,
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, source: &SourceConfig) -> Arc<RateGate> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates
            .entry(source.url.clone())
            .or_insert_with(|| Arc::new(RateGate::new(Duration::from_millis(source.min_interval_ms))))
            .clone()
    }

    fn jitter(&self) -> Duration {
        let max = self.policy.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Fetch one endpoint with its configured parameters.
    ///
    /// Every attempt, rate-limit wait and backoff sleep shares a single
    /// deadline. Cancelling `cancel` abandons whatever is in flight.
    pub async fn fetch(
        &self,
        source: &SourceConfig,
        cancel: &CancellationToken,
    ) -> std::result::Result<RawPayload, FetchError> {
        let endpoint = source.name.as_str();
        let url = build_url(source)
            .map_err(|msg| FetchError::new(endpoint, FetchErrorKind::Permanent, 0, msg))?;

        let gate = self.gate(source);
        let deadline = Instant::now() + self.deadline;
        let mut state = RetryState::new(self.policy.clone(), deadline);

        loop {
            let attempt = async {
                gate.wait().await;
                self.transport.get(&url).await
            };
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FetchError::new(endpoint, FetchErrorKind::Cancelled, state.attempts(), "cancelled"));
                }
                r = tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), attempt) => r,
            };

            let (outcome, response, message) = match result {
                Err(_) => {
                    return Err(FetchError::new(
                        endpoint,
                        FetchErrorKind::Timeout,
                        state.attempts() + 1,
                        format!("deadline of {}s exceeded", self.deadline.as_secs()),
                    ));
                }
                Ok(Ok(resp)) => {
                    let outcome = Outcome::from_status(resp.status, resp.retry_after);
                    let message = format!("HTTP {}", resp.status);
                    (outcome, Some(resp), message)
                }
                Ok(Err(failure)) => {
                    let outcome = if failure.is_transient() {
                        Outcome::Transient { retry_after: None }
                    } else {
                        Outcome::Permanent
                    };
                    (outcome, None, failure.message().to_string())
                }
            };

            match state.next(&outcome, Instant::now(), self.jitter()) {
                Step::Done => {
                    let TransportResponse { status, body, .. } = response.unwrap_or_else(|| {
                        TransportResponse::new(200, String::new())
                    });
                    debug!(endpoint, attempts = state.attempts(), status, "fetched");
                    return Ok(RawPayload {
                        endpoint: endpoint.to_string(),
                        url,
                        status,
                        body,
                        retrieved_at: Utc::now(),
                        attempts: state.attempts(),
                    });
                }
                Step::Fail(kind) => {
                    return Err(FetchError::new(endpoint, kind, state.attempts(), message));
                }
                Step::Retry(wait) => {
                    warn!(
                        endpoint,
                        attempt = state.attempts(),
                        wait_ms = wait.as_millis() as u64,
                        reason = %message,
                        "retrying fetch"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(FetchError::new(endpoint, FetchErrorKind::Cancelled, state.attempts(), "cancelled"));
                        }
                        _ = sleep(wait) => {}
                    }
                }
            }
        }
    }
}

/// Endpoint URL with its query parameters appended.
pub fn build_url(source: &SourceConfig) -> std::result::Result<String, String> {
    let base = reqwest::Url::parse(&source.url)
        .map_err(|e| format!("invalid endpoint URL {}: {e}", source.url))?;
    if source.params.is_empty() {
        return Ok(base.to_string());
    }
    let query = serde_urlencoded::to_string(&source.params)
        .map_err(|e| format!("cannot encode parameters: {e}"))?;
    let separator = if base.query().is_some() { '&' } else { '?' };
    Ok(format!("{base}{separator}{query}"))
}
