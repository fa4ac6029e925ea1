use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::stream;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ConnectorFactory;
use super::ListWatchConnector;
use super::WatchStream;
use crate::constants::DEFAULT_SOURCE_EVENT_BUFFER;
use crate::constants::DEFAULT_SOURCE_HISTORY;
use crate::CacheError;
use crate::ConnectorError;
use crate::DynamicObject;
use crate::ListOptions;
use crate::ObjectKey;
use crate::ObjectList;
use crate::ObjectReader;
use crate::ResourceScope;
use crate::ResourceType;
use crate::Result;
use crate::TypeRegistry;
use crate::WatchEvent;

#[derive(Debug, Clone)]
struct RecordedEvent {
    revision: u64,
    resource_type: ResourceType,
    event: WatchEvent,
}

impl RecordedEvent {
    fn visible_to(
        &self,
        resource_type: &ResourceType,
        namespace: &str,
    ) -> bool {
        if &self.resource_type != resource_type {
            return false;
        }
        match &self.event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                namespace.is_empty() || obj.meta.namespace == namespace
            }
            WatchEvent::Bookmark { .. } | WatchEvent::Expired => true,
        }
    }
}

#[derive(Default)]
struct SourceState {
    /// Last revision handed out; every mutation bumps it
    revision: u64,
    objects: HashMap<ResourceType, BTreeMap<ObjectKey, DynamicObject>>,
    /// Most recent events, oldest first
    history: VecDeque<RecordedEvent>,
}

#[derive(Default)]
struct FaultInjection {
    list_failures: AtomicUsize,
    watch_failures: AtomicUsize,
    create_failures: AtomicUsize,
}

impl FaultInjection {
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

struct SourceInner {
    state: RwLock<SourceState>,
    events: broadcast::Sender<RecordedEvent>,
    history_capacity: usize,
    faults: FaultInjection,
    list_calls: AtomicUsize,
    connector_creations: AtomicUsize,
}

/// Authoritative in-process source of objects.
///
/// Every mutation is stamped with a monotonically increasing revision used as
/// the object's resource version. A bounded history lets a watch resume from
/// a recent version; older versions get [`WatchEvent::Expired`].
///
/// The source doubles as a [`ConnectorFactory`] and as the direct, uncached
/// [`ObjectReader`] behind [`crate::CompositeClient`].
#[derive(Clone)]
pub struct InMemorySource {
    inner: Arc<SourceInner>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_SOURCE_HISTORY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_SOURCE_EVENT_BUFFER);
        Self {
            inner: Arc::new(SourceInner {
                state: RwLock::new(SourceState::default()),
                events,
                history_capacity: history_capacity.max(1),
                faults: FaultInjection::default(),
                list_calls: AtomicUsize::new(0),
                connector_creations: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates or replaces an object. Returns the stored copy carrying its new
    /// resource version.
    pub fn apply(
        &self,
        resource_type: &ResourceType,
        mut object: DynamicObject,
    ) -> DynamicObject {
        let mut state = self.inner.state.write();
        state.revision += 1;
        object.meta.resource_version = state.revision.to_string();

        let objects = state.objects.entry(resource_type.clone()).or_default();
        let event = match objects.insert(object.key(), object.clone()) {
            Some(_) => WatchEvent::Modified(object.clone()),
            None => WatchEvent::Added(object.clone()),
        };
        let revision = state.revision;
        self.record(&mut state, revision, resource_type, event);

        object
    }

    /// Removes an object; `None` when it did not exist.
    pub fn delete(
        &self,
        resource_type: &ResourceType,
        key: &ObjectKey,
    ) -> Option<DynamicObject> {
        let mut state = self.inner.state.write();
        let mut removed = state.objects.get_mut(resource_type)?.remove(key)?;

        state.revision += 1;
        removed.meta.resource_version = state.revision.to_string();
        let revision = state.revision;
        self.record(&mut state, revision, resource_type, WatchEvent::Deleted(removed.clone()));

        Some(removed)
    }

    /// Tells every live watcher of `resource_type` that it must relist.
    pub fn expire_watches(
        &self,
        resource_type: &ResourceType,
    ) {
        let state = self.inner.state.read();
        let _ = self.inner.events.send(RecordedEvent {
            revision: state.revision,
            resource_type: resource_type.clone(),
            event: WatchEvent::Expired,
        });
    }

    /// Current revision of the whole source.
    pub fn revision(&self) -> u64 {
        self.inner.state.read().revision
    }

    /// Makes the next `n` list calls fail.
    pub fn fail_next_lists(
        &self,
        n: usize,
    ) {
        self.inner.faults.list_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` watch calls fail.
    pub fn fail_next_watches(
        &self,
        n: usize,
    ) {
        self.inner.faults.watch_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` connector factory calls fail.
    pub fn fail_next_connector_creations(
        &self,
        n: usize,
    ) {
        self.inner.faults.create_failures.store(n, Ordering::SeqCst);
    }

    /// Number of list calls served so far, failed ones included.
    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Number of connector factory invocations, failed ones included.
    pub fn connector_creations(&self) -> usize {
        self.inner.connector_creations.load(Ordering::SeqCst)
    }

    fn record(
        &self,
        state: &mut SourceState,
        revision: u64,
        resource_type: &ResourceType,
        event: WatchEvent,
    ) {
        let recorded = RecordedEvent {
            revision,
            resource_type: resource_type.clone(),
            event,
        };
        trace!(revision, resource_type = %resource_type, "recording event");

        state.history.push_back(recorded.clone());
        while state.history.len() > self.inner.history_capacity {
            state.history.pop_front();
        }

        // No receivers is fine: nobody is watching yet.
        let _ = self.inner.events.send(recorded);
    }

    fn snapshot(
        &self,
        resource_type: &ResourceType,
        options: &ListOptions,
    ) -> (Vec<DynamicObject>, u64) {
        let state = self.inner.state.read();
        let items = state
            .objects
            .get(resource_type)
            .map(|objects| objects.values().filter(|o| options.matches(o)).cloned().collect())
            .unwrap_or_default();
        (items, state.revision)
    }
}

impl ConnectorFactory for InMemorySource {
    fn create(
        &self,
        resource_type: &ResourceType,
        namespace: &str,
        type_registry: &TypeRegistry,
    ) -> Result<Arc<dyn ListWatchConnector>> {
        self.inner.connector_creations.fetch_add(1, Ordering::SeqCst);

        if FaultInjection::take(&self.inner.faults.create_failures) {
            return Err(ConnectorError::FactoryFailed {
                resource_type: resource_type.clone(),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let namespace = match type_registry.scope_of(resource_type) {
            Ok(ResourceScope::Namespaced) => namespace.to_string(),
            Ok(ResourceScope::Cluster) => String::new(),
            Err(_) => {
                return Err(ConnectorError::FactoryFailed {
                    resource_type: resource_type.clone(),
                    reason: "resource type is not registered".to_string(),
                }
                .into())
            }
        };

        debug!(resource_type = %resource_type, namespace = %namespace, "memory connector created");
        Ok(Arc::new(MemoryConnector {
            source: self.clone(),
            resource_type: resource_type.clone(),
            namespace,
        }))
    }
}

#[async_trait]
impl ObjectReader for InMemorySource {
    async fn get(
        &self,
        resource_type: &ResourceType,
        key: &ObjectKey,
    ) -> Result<DynamicObject> {
        let state = self.inner.state.read();
        state
            .objects
            .get(resource_type)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| {
                CacheError::NotFound {
                    resource_type: resource_type.clone(),
                    key: key.clone(),
                }
                .into()
            })
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>> {
        Ok(self.snapshot(resource_type, options).0)
    }
}

/// Connector scoped to one resource type and namespace of an [`InMemorySource`].
pub struct MemoryConnector {
    source: InMemorySource,
    resource_type: ResourceType,
    namespace: String,
}

#[async_trait]
impl ListWatchConnector for MemoryConnector {
    async fn list(&self) -> Result<ObjectList> {
        let inner = &self.source.inner;
        inner.list_calls.fetch_add(1, Ordering::SeqCst);

        if FaultInjection::take(&inner.faults.list_failures) {
            return Err(ConnectorError::ListFailed {
                resource_type: self.resource_type.clone(),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let options = if self.namespace.is_empty() {
            ListOptions::default()
        } else {
            ListOptions::in_namespace(self.namespace.clone())
        };
        let (items, revision) = self.source.snapshot(&self.resource_type, &options);

        Ok(ObjectList {
            items,
            resource_version: revision.to_string(),
        })
    }

    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<WatchStream> {
        let inner = &self.source.inner;

        if FaultInjection::take(&inner.faults.watch_failures) {
            return Err(ConnectorError::WatchFailed {
                resource_type: self.resource_type.clone(),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let from: u64 = resource_version.parse().map_err(|_| ConnectorError::WatchFailed {
            resource_type: self.resource_type.clone(),
            reason: format!("invalid resource version {:?}", resource_version),
        })?;

        // Subscribe and read history under the same lock so that no event
        // falls between replay and live delivery.
        let state = inner.state.read();
        let receiver = inner.events.subscribe();

        let oldest_retained = state.history.front().map(|e| e.revision);
        let compacted = from < state.revision && oldest_retained.map(|oldest| oldest > from + 1).unwrap_or(true);
        if compacted {
            warn!(
                resource_type = %self.resource_type,
                from,
                current = state.revision,
                "requested resource version is no longer retained"
            );
            return Ok(stream::iter(vec![Ok(WatchEvent::Expired)]).boxed());
        }

        let replay: Vec<Result<WatchEvent>> = state
            .history
            .iter()
            .filter(|e| e.revision > from && e.visible_to(&self.resource_type, &self.namespace))
            .map(|e| Ok(e.event.clone()))
            .collect();
        drop(state);

        let resource_type = self.resource_type.clone();
        let namespace = self.namespace.clone();
        let live = BroadcastStream::new(receiver).filter_map(move |item| {
            let out = match item {
                Ok(recorded) if recorded.visible_to(&resource_type, &namespace) => Some(Ok(recorded.event)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!(resource_type = %resource_type, missed, "watcher lagged behind the source");
                    Some(Ok(WatchEvent::Expired))
                }
            };
            future::ready(out)
        });

        Ok(stream::iter(replay).chain(live).boxed())
    }
}
