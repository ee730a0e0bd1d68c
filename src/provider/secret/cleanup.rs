//! # Best-Effort Delete
//!
//! Deletion policy for `delete` and for the old identity after a rename.
//! A failure is logged at `warn` with the neutral store message, counted, and
//! swallowed. It never fails the operation that asked for it.

use crate::cache::ClientCache;
use crate::observability::metrics;
use tracing::{debug, info, warn};

/// What a best-effort delete observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing active under that name
    AlreadyAbsent,
    /// Logged and swallowed
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffortDelete;

impl BestEffortDelete {
    /// Soft-delete `{store_name, name}`; `reason` goes into the log line
    pub async fn run(
        &self,
        cache: &ClientCache,
        store_name: &str,
        name: &str,
        reason: &str,
    ) -> DeleteOutcome {
        let client = match cache.get_client(store_name).await {
            Ok(client) => client,
            Err(err) => {
                return Self::failed(store_name, name, reason, &err.message);
            }
        };

        match client.delete_secret(name).await {
            Ok(()) => {
                info!(vault.name = store_name, secret.name = name, reason, "Deleted secret");
                DeleteOutcome::Deleted
            }
            Err(err) if err.is_not_found() => {
                debug!(vault.name = store_name, secret.name = name, reason, "Secret already absent");
                DeleteOutcome::AlreadyAbsent
            }
            Err(err) => Self::failed(store_name, name, reason, &err.message),
        }
    }

    fn failed(store_name: &str, name: &str, reason: &str, message: &str) -> DeleteOutcome {
        warn!(
            vault.name = store_name,
            secret.name = name,
            reason,
            error = message,
            "Failed to delete secret; it remains in the store and can be removed manually"
        );
        metrics::increment_best_effort_delete_failures();
        DeleteOutcome::Failed
    }
}
