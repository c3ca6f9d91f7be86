// src/services/retry.rs
//! Bounded retry policy with exponential backoff.

use crate::config::Settings;
use crate::error::PlcError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Submissions attempted by `create` before giving up.
    pub max_create_attempts: usize,
    /// Attempts per rotation key for `update` and `deactivate`.
    pub retries_per_key: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Verify the fetched audit log before building on it.
    pub verify_audit_log: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for RetryPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            max_create_attempts: settings.max_create_attempts,
            retries_per_key: settings.retries_per_key,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            verify_audit_log: settings.verify_audit_log,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping.
    pub fn immediate(max_create_attempts: usize, retries_per_key: usize) -> Self {
        Self {
            max_create_attempts,
            retries_per_key,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            verify_audit_log: true,
        }
    }

    /// Total attempts for an update or deactivate signed by `keys` rotation keys.
    pub fn attempt_budget(&self, keys: usize) -> usize {
        self.retries_per_key.saturating_mul(keys)
    }

    /// Delay before retry number `attempt` (1-based): doubles every time,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Sleeps before retry number `attempt`, waking early on cancellation.
    pub async fn pause(&self, attempt: usize, cancel: &CancellationToken) -> Result<(), PlcError> {
        if cancel.is_cancelled() {
            return Err(PlcError::Cancelled);
        }
        let delay = self.backoff(attempt);
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PlcError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
