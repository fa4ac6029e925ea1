use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::ConnectorFactory;
use crate::InMemorySource;
use crate::ListWatchConnector;
use crate::ObjectKey;
use crate::ResourceType;
use crate::Result;
use crate::TypeRegistry;
use crate::WorkQueue;

/// Connector factory that counts invocations per call and can stall each
/// creation to widen race windows.
pub struct CountingFactory {
    pub source: InMemorySource,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingFactory {
    pub fn new(source: InMemorySource) -> Self {
        Self::with_delay(source, Duration::ZERO)
    }

    pub fn with_delay(
        source: InMemorySource,
        delay: Duration,
    ) -> Self {
        Self {
            source,
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConnectorFactory for CountingFactory {
    fn create(
        &self,
        resource_type: &ResourceType,
        namespace: &str,
        type_registry: &TypeRegistry,
    ) -> Result<Arc<dyn ListWatchConnector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.source.create(resource_type, namespace, type_registry)
    }
}

/// Work queue double remembering every accepted key in order.
#[derive(Default)]
pub struct RecordingQueue {
    keys: Mutex<Vec<ObjectKey>>,
}

impl RecordingQueue {
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.keys.lock().clone()
    }
}

impl WorkQueue for RecordingQueue {
    fn add(
        &self,
        key: ObjectKey,
    ) -> bool {
        self.keys.lock().push(key);
        true
    }
}
