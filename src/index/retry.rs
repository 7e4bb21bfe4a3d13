//! Optimistic-concurrency retry around a store mutation.
//!
//! A mutation reads what it needs and writes its changes inside one deferred
//! transaction. If the commit conflicts with another writer, the transaction is
//! rolled back, which discards every pending change of that attempt, and the
//! mutation is run again from scratch against the current state after an
//! exponential backoff. Attempts are bounded.

use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::StoreError;

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `mutation` in a transaction and commit it, retrying on conflicts.
pub fn modify_database<T, F>(conn: &mut Connection, policy: &RetryPolicy, mutation: F) -> Result<T, StoreError>
where
    F: Fn(&Transaction<'_>) -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let err = match attempt_once(conn, &mutation) {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Mutation committed after {} attempts", attempt);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_conflict() {
            return Err(err);
        }

        if attempt >= policy.max_attempts {
            warn!("Mutation still conflicting after {} attempts: {}", attempt, err);
            return Err(StoreError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.backoff(attempt);
        debug!("Commit conflict on attempt {} ({}), retrying in {:?}", attempt, err, delay);
        std::thread::sleep(delay);
    }
}

fn attempt_once<T, F>(conn: &mut Connection, mutation: &F) -> Result<T, StoreError>
where
    F: Fn(&Transaction<'_>) -> Result<T, StoreError>,
{
    // Dropping the transaction on any error path rolls it back
    let tx = conn.transaction()?;
    let value = mutation(&tx)?;
    tx.commit()?;
    Ok(value)
}
