use std::time::Duration;

use dashmap::DashMap;

use crate::ObjectKey;
use crate::QueueConfig;

/// Per-key exponential delay: `min(base * 2^failures, max)`.
#[derive(Debug)]
pub struct ExponentialFailureRateLimiter {
    base: Duration,
    max: Duration,
    failures: DashMap<ObjectKey, u32>,
}

impl ExponentialFailureRateLimiter {
    pub fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay())
    }

    /// Delay before `key` may be retried; counts one more failure.
    pub fn when(
        &self,
        key: &ObjectKey,
    ) -> Duration {
        let mut failures = self.failures.entry(key.clone()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Clears the failure history of `key`.
    pub fn forget(
        &self,
        key: &ObjectKey,
    ) {
        self.failures.remove(key);
    }

    pub fn num_requeues(
        &self,
        key: &ObjectKey,
    ) -> u32 {
        self.failures.get(key).map(|n| *n).unwrap_or(0)
    }
}
