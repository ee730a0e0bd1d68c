//! # Soft-Delete Recovery
//!
//! Brings a soft-deleted secret back to the active state before it is
//! written. Key Vault starts recovery asynchronously, so after the recover
//! call the secret is polled until it is gettable, with a Fibonacci backoff
//! between polls and a fixed attempt budget.

use crate::constants::{
    DEFAULT_RECOVERY_INITIAL_INTERVAL_MS, DEFAULT_RECOVERY_MAX_ATTEMPTS,
    DEFAULT_RECOVERY_MAX_INTERVAL_MS,
};
use crate::error::{AuthError, StoreErrorKind};
use crate::store::SecretStore;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Polling budget for recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Number of `get` polls after the recover call (at least 1)
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RECOVERY_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_RECOVERY_INITIAL_INTERVAL_MS),
            Duration::from_millis(DEFAULT_RECOVERY_MAX_INTERVAL_MS),
        )
    }
}

impl RecoveryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval,
            max_interval: max_interval.max(initial_interval),
        }
    }

    /// No waiting between polls
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.initial_interval, self.max_interval)
    }
}

/// Fibonacci sequence of delays: `min, min, 2*min, 3*min, 5*min, ...` capped at `max`
#[derive(Debug, Clone)]
pub(crate) struct FibonacciBackoff {
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    pub(crate) fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }
}

/// Why recovery gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecoveryFailure {
    pub attempts: u32,
    pub message: String,
    /// Set when no token could be obtained; not a recovery problem as such
    pub auth: Option<AuthError>,
}

/// Recover `name` and wait until it is active
///
/// Returns the number of polls it took. A recover call answered with
/// `Conflict` means recovery is already under way and is polled like any
/// other. `NotFound` means the name is no longer soft-deleted, so there is
/// nothing to wait for.
pub(crate) async fn recover_secret(
    store: &dyn SecretStore,
    name: &str,
    policy: &RecoveryPolicy,
) -> Result<u32, RecoveryFailure> {
    match store.recover_deleted_secret(name).await {
        Ok(()) => {}
        Err(err) if err.kind == StoreErrorKind::Conflict => {
            debug!(secret.name = name, "Recovery already in progress");
        }
        Err(err) if err.is_not_found() => {
            debug!(secret.name = name, "Secret no longer soft-deleted, nothing to recover");
            return Ok(0);
        }
        Err(err) => {
            return Err(RecoveryFailure {
                attempts: 0,
                message: err.message,
                auth: err.auth,
            });
        }
    }

    let mut backoff = policy.backoff();
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match store.get_secret(name).await {
            Ok(Some(_)) => {
                info!(secret.name = name, attempts = attempt, "Recovered soft-deleted secret");
                return Ok(attempt);
            }
            Ok(None) => {
                debug!(secret.name = name, attempt, "Secret not active yet");
            }
            Err(err) if err.is_transient() || err.is_not_found() => {
                debug!(secret.name = name, attempt, error = %err, "Transient error while polling recovery");
                last_error = Some(err.message);
            }
            Err(err) => {
                return Err(RecoveryFailure {
                    attempts: attempt,
                    message: err.message,
                    auth: err.auth,
                });
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(backoff.next_backoff()).await;
        }
    }

    warn!(
        secret.name = name,
        attempts = policy.max_attempts,
        "Soft-deleted secret did not become active"
    );
    Err(RecoveryFailure {
        attempts: policy.max_attempts,
        message: last_error.unwrap_or_else(|| "secret did not become active".to_string()),
        auth: None,
    })
}
