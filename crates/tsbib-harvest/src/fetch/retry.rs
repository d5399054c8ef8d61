//! Retry decisions as a pure state machine. Nothing here sleeps or reads a
//! clock; callers pass `now` and the jitter sample in.

use std::time::{Duration, Instant};

use tsbib_core::FetchConfig;

use crate::error::FetchErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// `base * 2^retry`, capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Transient { retry_after: Option<Duration> },
    Permanent,
}

impl Outcome {
    /// 2xx succeeds; 408, 429 and 5xx are worth retrying; everything else is
    /// final.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            200..=299 => Outcome::Success,
            408 | 429 | 500..=599 => Outcome::Transient { retry_after },
            _ => Outcome::Permanent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Done,
    Retry(Duration),
    Fail(FetchErrorKind),
}

#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    deadline: Instant,
    attempts: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy, deadline: Instant) -> Self {
        Self {
            policy,
            deadline,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Record a finished attempt and decide what happens next. `jitter` is
    /// added to computed backoffs; it is clamped to the policy's maximum.
    pub fn next(&mut self, outcome: &Outcome, now: Instant, jitter: Duration) -> Step {
        self.attempts += 1;
        let retry_after = match outcome {
            Outcome::Success => return Step::Done,
            Outcome::Permanent => return Step::Fail(FetchErrorKind::Permanent),
            Outcome::Transient { retry_after } => *retry_after,
        };

        if self.attempts >= self.policy.max_attempts {
            return Step::Fail(FetchErrorKind::Transient);
        }

        let wait = retry_after.unwrap_or_else(|| {
            self.policy.backoff(self.attempts - 1) + jitter.min(self.policy.jitter)
        });
        if now + wait >= self.deadline {
            return Step::Fail(FetchErrorKind::Timeout);
        }
        Step::Retry(wait)
    }
}
