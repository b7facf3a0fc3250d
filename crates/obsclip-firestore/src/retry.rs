//! Bounded retry for transient Firestore failures.
//!
//! Only errors reporting `is_retryable` are repeated. Stale writes and
//! other rejections go straight back to the caller.

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::error::FirestoreResult;
use crate::metrics::record_retry;

/// Attempts and backoff bounds for one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl RetryPolicy {
    /// Read `FIRESTORE_MAX_RETRIES`, `FIRESTORE_RETRY_BASE_MS` and
    /// `FIRESTORE_RETRY_MAX_MS`, keeping defaults for unset or bad values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_u64("FIRESTORE_MAX_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_retries),
            base_delay: env_u64("FIRESTORE_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: env_u64("FIRESTORE_RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        }
    }

    /// Wait before retry number `retry` (zero-based).
    ///
    /// A server hint is used as-is. Otherwise the exponential ceiling is
    /// jittered uniformly between `base_delay` and the ceiling.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }

        let ceiling = self
            .base_delay
            .saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .min(self.max_delay)
            .max(self.base_delay);

        let spread = (ceiling - self.base_delay).as_millis() as u64;
        if spread == 0 {
            return ceiling;
        }
        let roll = RandomState::new().hash_one(retry) % (spread + 1);
        self.base_delay + Duration::from_millis(roll)
    }

    /// Run `op` until it succeeds, fails permanently or retries run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let mut retry = 0;
        loop {
            let span = info_span!("firestore_attempt", operation = %operation, attempt = retry + 1);
            let err = match op().instrument(span).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry < self.max_retries => e,
                Err(e) => return Err(e),
            };

            let delay = self.delay_for(retry, err.backoff_hint());
            warn!(
                operation = %operation,
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                "Firestore call failed, retrying: {}",
                err
            );
            record_retry(operation);
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}
