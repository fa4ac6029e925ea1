//! Rate limited work queue fed by the cache based event handler.

mod rate_limiter;
mod rate_limiting_queue;

pub use rate_limiter::*;
pub use rate_limiting_queue::*;


#[cfg(test)]
use mockall::automock;

use crate::ObjectKey;

/// Sink for keys that need reconciling.
#[cfg_attr(test, automock)]
pub trait WorkQueue: Send + Sync + 'static {
    /// Returns false if the key was refused, e.g. after shutdown.
    fn add(
        &self,
        key: ObjectKey,
    ) -> bool;
}
