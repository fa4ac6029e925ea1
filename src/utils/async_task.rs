use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::ConnectorError;
use crate::Error;
use crate::Result;

/// Doubling delay sequence bounded by `max`.
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    pub(crate) fn new(policy: &BackoffPolicy) -> Self {
        Self {
            base: policy.base_delay(),
            max: policy.max_delay(),
            current: policy.base_delay(),
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Runs `task` until it succeeds, applying a per-attempt timeout and an
/// exponential delay between attempts.
///
/// `policy.max_retries == 0` retries until `shutdown` fires. Cancellation is
/// observed both during an attempt and during the delay.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
    shutdown: &CancellationToken,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let mut retries = 0;
    let mut backoff = ExponentialBackoff::new(&policy);

    loop {
        let attempt = tokio::select! {
            _ = shutdown.cancelled() => return Err(ConnectorError::Cancelled.into()),
            r = timeout(policy.timeout(), task()) => r,
        };

        let last_error: Error = match attempt {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => {
                warn!("failed with error: {:?}", &e);
                e
            }
            Err(_) => {
                warn!("attempt timed out after {:?}", policy.timeout());
                ConnectorError::RetryTimeout(policy.timeout()).into()
            }
        };

        retries += 1;
        if policy.max_retries != 0 && retries >= policy.max_retries {
            warn!("Task failed after {} retries, last error: {}", retries, last_error);
            return Err(ConnectorError::RetryExhausted(retries).into());
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Err(ConnectorError::Cancelled.into()),
            _ = sleep(backoff.next_delay()) => {}
        }
    }
}

/// Spawns a named task, logging its error instead of dropping it silently,
/// and records the handle when a collector is given.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
