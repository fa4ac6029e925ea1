use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::CacheMissDetector;
use crate::DynamicObject;
use crate::WorkQueue;

/// One externally observed change. `object` may be absent when the producer
/// failed to decode it. `deleted` marks the object's final notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeNotification {
    pub object: Option<DynamicObject>,
    pub deleted: bool,
}

impl ChangeNotification {
    pub fn new(object: DynamicObject) -> Self {
        Self {
            object: Some(object),
            deleted: false,
        }
    }

    pub fn deleted(object: DynamicObject) -> Self {
        Self {
            object: Some(object),
            deleted: true,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<DynamicObject> for ChangeNotification {
    fn from(object: DynamicObject) -> Self {
        Self::new(object)
    }
}

/// Enqueues the key of every notification the detector reports as a miss.
pub struct CacheBasedEventHandler {
    detector: Arc<dyn CacheMissDetector>,
    queue: Arc<dyn WorkQueue>,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl std::fmt::Debug for CacheBasedEventHandler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheBasedEventHandler")
            .field("enqueued", &self.enqueued())
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl CacheBasedEventHandler {
    pub fn new(
        detector: Arc<dyn CacheMissDetector>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            detector,
            queue,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Processes one notification. Returns true if a work item was enqueued.
    pub fn handle(
        &self,
        notification: &ChangeNotification,
    ) -> bool {
        let object = match &notification.object {
            Some(object) if object.has_identity() => object,
            _ => {
                warn!("dropping change notification without object identity");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let key = object.key();
        if notification.deleted {
            // Deletions are always reconciled and end the key's history
            self.detector.forget(&key);
        } else if !self.detector.cache_miss(object) {
            trace!(%key, "already seen, skipping");
            return false;
        }

        debug!(
            %key,
            resource_version = object.resource_version(),
            deleted = notification.deleted,
            "cache miss, enqueueing"
        );
        if !self.queue.add(key.clone()) {
            warn!(%key, "work queue refused key");
            return false;
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Handles notifications one at a time until the channel closes or
    /// `cancel` fires.
    pub async fn run(
        &self,
        mut notifications: mpsc::Receiver<ChangeNotification>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = notifications.recv() => match next {
                    Some(notification) => {
                        self.handle(&notification);
                    }
                    None => break,
                }
            }
        }

        info!(
            enqueued = self.enqueued(),
            dropped = self.dropped(),
            "event handler stopped"
        );
    }

    /// Work items the queue accepted so far.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Notifications dropped for lack of object identity.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
