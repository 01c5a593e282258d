//! Per-error-kind retry policy.
//!
//! Each [`ErrorKind`] may carry a delay. A failed attempt is retried after
//! that delay as long as the delay is positive and waiting it out would
//! still land before the operation's deadline.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ErrorKind;

/// Delays applied when no override is configured.
const DEFAULT_DELAYS_MS: [(ErrorKind, u64); 5] = [
    (ErrorKind::ResponseError, 500),
    (ErrorKind::ResponseAborted, 500),
    (ErrorKind::ConnectTimeout, 1_000),
    (ErrorKind::ConnectionRefused, 10_000),
    (ErrorKind::NetworkUnreachable, 10_000),
];

/// Mapping from error kind to retry delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: HashMap<ErrorKind, Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_DELAYS_MS
                .iter()
                .map(|&(kind, ms)| (kind, Duration::from_millis(ms)))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Merge overrides over this policy. A zero delay disables retry for
    /// that kind.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (ErrorKind, Duration)>,
    {
        self.delays.extend(overrides);
        self
    }

    /// The configured delay for `kind`, if it is strictly positive.
    pub fn delay_for(&self, kind: ErrorKind) -> Option<Duration> {
        self.delays.get(&kind).copied().filter(|d| !d.is_zero())
    }

    /// Decide whether a failure of `kind` observed at `now` is retried.
    ///
    /// Returns the delay to wait, or `None` when the failure is final:
    /// retries are disabled (`expiration` is zero), the kind has no
    /// positive delay, or `now + delay` reaches the deadline.
    pub fn next_delay(
        &self,
        kind: ErrorKind,
        expiration: Duration,
        now: Instant,
        deadline: Instant,
    ) -> Option<Duration> {
        if expiration.is_zero() {
            return None;
        }
        let delay = self.delay_for(kind)?;
        match now.checked_add(delay) {
            Some(resume_at) if resume_at < deadline => Some(delay),
            _ => None,
        }
    }
}
