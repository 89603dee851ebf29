//! Backoff policy for rate-limited (`429`) responses and failed connections.

use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, Method, Response, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
    /// Cap for both computed delays and `Retry-After` values.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether a response with `status` may be retried after `attempt` retries.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries
    }

    /// Whether a request that got no response may be retried after `attempt` retries.
    ///
    /// Connection failures are retried for every method since nothing reached
    /// the provider. Timeouts are retried for `GET` only.
    #[must_use]
    pub fn should_retry_error(&self, attempt: u32, method: &Method, error: &reqwest::Error) -> bool {
        attempt < self.max_retries
            && (error.is_connect() || (error.is_timeout() && *method == Method::GET))
    }

    /// Delay before retry number `attempt + 1`: `base_delay * 2^attempt`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay for a rate-limited response, preferring its `Retry-After`.
    #[must_use]
    pub fn delay_for_response(&self, attempt: u32, response: &Response) -> Duration {
        retry_after(response).map_or_else(
            || self.delay_for(attempt),
            |delay| delay.min(self.max_delay),
        )
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()))
}

/// Parse delay-seconds (`120`) or an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`).
/// A date in the past means no delay.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        date.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
