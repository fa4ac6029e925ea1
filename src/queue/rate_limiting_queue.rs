use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::debug;
use tracing::trace;

use super::ExponentialFailureRateLimiter;
use super::WorkQueue;
use crate::ObjectKey;
use crate::QueueConfig;

#[derive(Default)]
struct QueueState {
    /// Keys ready to hand out, in arrival order
    queue: VecDeque<ObjectKey>,
    /// Keys that need processing, queued or waiting for `done`
    dirty: HashSet<ObjectKey>,
    /// Keys handed out and not yet `done`
    processing: HashSet<ObjectKey>,
    shutting_down: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
    limiter: ExponentialFailureRateLimiter,
}

/// FIFO work queue with per-key deduplication and rate limited requeues.
///
/// A key added while already waiting is coalesced into the waiting entry. A
/// key added while being processed is handed out again after
/// [`done`](Self::done), so one key is never processed by two consumers at
/// once.
#[derive(Clone)]
pub struct RateLimitingQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for RateLimitingQueue {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RateLimitingQueue")
            .field("len", &self.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl RateLimitingQueue {
    pub fn new(limiter: ExponentialFailureRateLimiter) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                limiter,
            }),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(ExponentialFailureRateLimiter::from_config(config))
    }

    /// Marks `key` for processing. False only when the queue is shutting
    /// down; a key already pending or in flight is accepted and coalesced.
    pub fn add(
        &self,
        key: ObjectKey,
    ) -> bool {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            debug!(%key, "queue is shutting down, ignoring key");
            return false;
        }
        if !state.dirty.insert(key.clone()) {
            trace!(%key, "key already pending");
            return true;
        }
        if state.processing.contains(&key) {
            trace!(%key, "key in flight, requeued on done");
            return true;
        }
        state.queue.push_back(key);
        drop(state);

        self.inner.notify.notify_one();
        true
    }

    /// Next key to process. Drains what is left after shutdown, then
    /// returns `None`.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent add is not missed
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `key` as processed. A key re-added meanwhile is queued again.
    pub fn done(
        &self,
        key: &ObjectKey,
    ) {
        let mut state = self.inner.state.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Adds `key` once `delay` has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_after(
        &self,
        key: ObjectKey,
        delay: Duration,
    ) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.is_shutting_down() {
            return;
        }

        trace!(%key, ?delay, "delaying key");
        let queue = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            queue.add(key);
        });
    }

    /// Requeues `key` after its rate limiter delay.
    pub fn add_rate_limited(
        &self,
        key: ObjectKey,
    ) {
        let delay = self.inner.limiter.when(&key);
        self.add_after(key, delay);
    }

    /// Stops rate limiting `key`; call after it was processed successfully.
    pub fn forget(
        &self,
        key: &ObjectKey,
    ) {
        self.inner.limiter.forget(key);
    }

    pub fn num_requeues(
        &self,
        key: &ObjectKey,
    ) -> u32 {
        self.inner.limiter.num_requeues(key)
    }

    /// Keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects further adds and wakes every waiting consumer.
    pub fn shut_down(&self) {
        self.inner.state.lock().shutting_down = true;
        debug!("work queue shutting down");
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }
}

impl WorkQueue for RateLimitingQueue {
    fn add(
        &self,
        key: ObjectKey,
    ) -> bool {
        RateLimitingQueue::add(self, key)
    }
}
