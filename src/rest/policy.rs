use std::time::Duration;

use rand::Rng as _;
use reqwest::StatusCode;

use crate::error::{Error, Kind};

/// Statuses retried by default: every 5xx. A 4xx means the request itself is
/// wrong and sending it again cannot help.
#[must_use]
pub fn retry_on_server_error(status: StatusCode) -> bool {
    status.is_server_error()
}

/// How often and how patiently a request is re-sent.
///
/// Delays double from `base_delay` after each failed attempt (1s, 2s, 4s, ...
/// by default), capped at `max_delay`, plus up to `max_jitter` of random delay.
#[derive(Clone, Copy, Debug, bon::Builder)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 are treated as 1.
    #[builder(default = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    #[builder(default = Duration::from_secs(1))]
    base_delay: Duration,
    #[builder(default = Duration::from_secs(30))]
    max_delay: Duration,
    #[builder(default = Duration::from_millis(250))]
    max_jitter: Duration,
    #[builder(default = retry_on_server_error as fn(StatusCode) -> bool)]
    retryable_status: fn(StatusCode) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Retries up to `max_attempts` without sleeping in between.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::builder()
            .max_attempts(max_attempts)
            .base_delay(Duration::ZERO)
            .max_delay(Duration::ZERO)
            .max_jitter(Duration::ZERO)
            .build()
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    #[must_use]
    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }

    /// Deterministic part of the delay after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// [`Self::backoff`] plus random jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt).saturating_add(jitter)
    }

    #[must_use]
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        (self.retryable_status)(status)
    }

    /// Transport failures are always retryable; exchange errors only when their
    /// status is. Validation and decoding failures never are.
    #[must_use]
    pub fn is_retryable(&self, error: &Error) -> bool {
        match error.kind() {
            Kind::Network => true,
            Kind::Api => error
                .api()
                .is_some_and(|api| self.is_retryable_status(api.status)),
            _ => false,
        }
    }
}
