//! Challenge status polling.
//!
//! A poll handle is sampled on its own task until the provider reports a
//! terminal status or the policy deadline passes. The result crosses a
//! single-slot `oneshot` channel back to the waiting caller; a deadline that
//! passes without a terminal status closes the channel without a value, which
//! the waiting side reads as [`Verification::TimedOut`].
//!
//! Polls for one handle are strictly sequential: request, classify, sleep for
//! the fixed interval. Elapsed time is the sum of intervals slept, so the
//! handle is polled at `0, interval, 2 * interval, ...` up to and including
//! the deadline.

use crate::{challenge::PollHandle, transport::Transport, Error, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::{sync::oneshot, time::sleep};
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// Factor verify challenge, reported through `factorResult`.
    Push,
    /// Workflow challenge, reported through `status`.
    Workflow,
}

/// Status of a challenge as seen by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Success,
    Rejected,
}

impl ChallengeKind {
    #[must_use]
    pub fn status_field(self) -> &'static str {
        match self {
            Self::Push => "factorResult",
            Self::Workflow => "status",
        }
    }

    /// Classify a status response.
    /// # Errors
    /// Returns [`Error::MalformedResponse`] if the status field is missing.
    pub fn classify(self, page: &Value) -> Result<PollState> {
        let field = self.status_field();
        let status = page
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedResponse(format!("no {field} found")))?;

        let state = match (self, status) {
            (Self::Push, "SUCCESS") | (Self::Workflow, "VERIFIED") => PollState::Success,
            (Self::Push, "REJECTED") => PollState::Rejected,
            // Push results other than the two above (WAITING, TIMEOUT, ...) keep polling.
            (Self::Push, _) | (Self::Workflow, "PENDING") => PollState::Waiting,
            (Self::Workflow, _) => PollState::Rejected,
        };

        Ok(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Polling stops once the slept time exceeds this.
    pub deadline: Duration,
}

impl PollPolicy {
    #[must_use]
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    #[must_use]
    pub fn push() -> Self {
        Self::new(Duration::from_secs(4), Duration::from_secs(60))
    }

    #[must_use]
    pub fn workflow() -> Self {
        Self::new(Duration::from_secs(20), Duration::from_secs(100))
    }

    /// Number of polls issued when no terminal status is ever seen.
    #[must_use]
    pub fn max_polls(&self) -> u128 {
        if self.interval.is_zero() {
            return 0;
        }
        self.deadline.as_nanos() / self.interval.as_nanos() + 1
    }
}

/// Result of waiting on a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Success,
    Rejected,
    /// The deadline passed without a terminal status.
    TimedOut,
}

/// Poll `handle` on a background task and wait for its result.
/// # Errors
/// Returns an error if the policy interval is zero, a poll request fails, or a status response is malformed.
pub async fn wait_for(
    transport: &Transport,
    handle: PollHandle,
    policy: PollPolicy,
) -> Result<Verification> {
    if policy.interval.is_zero() {
        return Err(Error::Config("poll interval must be non-zero".to_string()));
    }

    let (mut tx, rx) = oneshot::channel();

    // Created here so the spawned task stays under the caller's span.
    let span = info_span!(
        "mfa_push.poll",
        kind = ?handle.kind,
        transaction_id = handle.transaction_id.map(tracing::field::display)
    );
    let transport = transport.clone();

    tokio::spawn(
        async move {
            let outcome = poll(&transport, &handle, policy, &mut tx).await;
            match outcome {
                Ok(Some(verification)) => {
                    let _ = tx.send(Ok(verification));
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        }
        .instrument(span),
    );

    // A closed channel means the poller ended without a terminal status.
    rx.await.unwrap_or(Ok(Verification::TimedOut))
}

async fn poll(
    transport: &Transport,
    handle: &PollHandle,
    policy: PollPolicy,
    waiter: &mut oneshot::Sender<Result<Verification>>,
) -> Result<Option<Verification>> {
    let mut elapsed = Duration::ZERO;
    let mut attempt: u32 = 0;

    debug!(
        interval_ms = u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
        max_polls = u64::try_from(policy.max_polls()).unwrap_or(u64::MAX),
        "polling challenge"
    );

    loop {
        attempt += 1;

        let page = transport.get(&handle.url).await?;

        match handle.kind.classify(&page)? {
            PollState::Success => {
                info!(attempt, "challenge approved");
                return Ok(Some(Verification::Success));
            }
            PollState::Rejected => {
                info!(attempt, "challenge rejected");
                return Ok(Some(Verification::Rejected));
            }
            PollState::Waiting => {
                debug!(attempt, "challenge pending");
            }
        }

        tokio::select! {
            () = waiter.closed() => {
                debug!(attempt, "waiter dropped, stopping");
                return Ok(None);
            }
            () = sleep(policy.interval) => {}
        }

        elapsed += policy.interval;

        if elapsed > policy.deadline {
            warn!(attempt, "no terminal status before deadline");
            return Ok(None);
        }
    }
}
