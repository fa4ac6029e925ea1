use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::StreamExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::async_task::ExponentialBackoff;
use crate::constants::RESYNC_JITTER_MAX_PERCENT;
use crate::constants::RESYNC_JITTER_MIN_PERCENT;
use crate::BackoffPolicy;
use crate::ConnectorError;
use crate::ListWatchConnector;
use crate::LocalIndexedReplica;
use crate::ResourceType;
use crate::Result;
use crate::WatchEvent;

/// Lifecycle of a subscription's run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered, manager not started yet
    Created,
    /// Run loop spawned
    Starting,
    /// Waiting for the first listing
    Syncing,
    /// Replica holds a full listing
    Synced,
    /// Run loop exited after shutdown
    Stopped,
}

/// Picks the effective resync period, uniformly in `[0.9 * base, 1.1 * base)`.
///
/// Spreads relists of many subscriptions created at once. A zero base stays
/// zero, meaning no periodic resync.
pub fn jittered_resync_period(base: Duration) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }

    let base_nanos = base.as_nanos();
    let lower = (base_nanos * RESYNC_JITTER_MIN_PERCENT).div_ceil(100);
    let upper = (base_nanos * RESYNC_JITTER_MAX_PERCENT).div_ceil(100);
    if lower >= upper {
        return base;
    }

    let nanos = rand::thread_rng().gen_range(lower..upper);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// One resource type's connector, replica and run loop.
pub struct Subscription {
    resource_type: ResourceType,
    connector: Arc<dyn ListWatchConnector>,
    replica: Arc<LocalIndexedReplica>,
    resync_period: Duration,
    retry: BackoffPolicy,
    state: Mutex<SubscriptionState>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("resource_type", &self.resource_type)
            .field("resync_period", &self.resync_period)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub(crate) fn new(
        resource_type: ResourceType,
        connector: Arc<dyn ListWatchConnector>,
        resync_period: Duration,
        retry: BackoffPolicy,
    ) -> Self {
        let replica = Arc::new(LocalIndexedReplica::new(resource_type.clone()));
        Self {
            resource_type,
            connector,
            replica,
            resync_period,
            retry,
            state: Mutex::new(SubscriptionState::Created),
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn replica(&self) -> &Arc<LocalIndexedReplica> {
        &self.replica
    }

    /// Effective (already jittered) resync period.
    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    pub fn has_synced(&self) -> bool {
        self.replica.has_synced()
    }

    /// `Stopped` is terminal.
    fn transition(
        &self,
        next: SubscriptionState,
    ) {
        let mut state = self.state.lock();
        if *state == SubscriptionState::Stopped || *state == next {
            return;
        }
        debug!(resource_type = %self.resource_type, from = ?*state, to = ?next, "subscription state change");
        *state = next;
    }

    /// Spawns the run loop, recording its handle. With `shutdown` already
    /// cancelled nothing is spawned and the subscription is `Stopped`.
    pub(crate) fn launch(
        self: &Arc<Self>,
        shutdown: CancellationToken,
        handles: &mut Vec<JoinHandle<()>>,
    ) {
        if shutdown.is_cancelled() {
            debug!(resource_type = %self.resource_type, "shutdown already requested, not launching");
            self.transition(SubscriptionState::Stopped);
            return;
        }

        self.transition(SubscriptionState::Starting);
        let subscription = self.clone();
        spawn_task(
            &format!("subscription {}", self.resource_type),
            move || async move {
                subscription.run(shutdown).await;
                Ok(())
            },
            Some(handles),
        );
    }

    /// List, watch, relist on expiry or resync, back off on failure; until
    /// `shutdown` fires.
    pub(crate) async fn run(
        &self,
        shutdown: CancellationToken,
    ) {
        info!(resource_type = %self.resource_type, resync_period = ?self.resync_period, "subscription running");
        let mut backoff = ExponentialBackoff::new(&self.retry);

        while !shutdown.is_cancelled() {
            match self.list_and_watch(&shutdown).await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    let delay = backoff.next_delay();
                    warn!(resource_type = %self.resource_type, ?delay, "list/watch failed, backing off: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        self.transition(SubscriptionState::Stopped);
        info!(resource_type = %self.resource_type, "subscription stopped");
    }

    /// One list followed by one watch. `Ok` means "relist now".
    async fn list_and_watch(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        if !self.replica.has_synced() {
            self.transition(SubscriptionState::Syncing);
        }

        let list = task_with_timeout_and_exponential_backoff(|| self.connector.list(), self.retry, shutdown).await?;
        let resource_version = list.resource_version.clone();
        self.replica.replace(list);

        let mut stream = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            r = self.connector.watch(&resource_version) => r?,
        };

        // Synced only once the watch following the listing is live
        if self.replica.mark_synced() {
            info!(resource_type = %self.resource_type, resource_version = %resource_version, "replica synced");
        }
        self.transition(SubscriptionState::Synced);

        // Zero disables periodic resync
        let resync_period = self.resync_period;
        let resync = async move {
            if resync_period.is_zero() {
                future::pending::<()>().await
            } else {
                sleep(resync_period).await
            }
        };
        tokio::pin!(resync);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = &mut resync => {
                    debug!(resource_type = %self.resource_type, "resync period elapsed, relisting");
                    return Ok(());
                }
                event = stream.next() => match event {
                    Some(Ok(WatchEvent::Expired)) => {
                        info!(resource_type = %self.resource_type, "watch expired, relisting");
                        return Ok(());
                    }
                    Some(Ok(event)) => self.replica.apply(event),
                    Some(Err(e)) => return Err(e),
                    None => return Err(ConnectorError::WatchClosed(self.resource_type.clone()).into()),
                }
            }
        }
    }
}
