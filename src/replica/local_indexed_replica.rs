use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::DynamicObject;
use crate::ObjectKey;
use crate::ObjectList;
use crate::ResourceType;
use crate::WatchEvent;

#[derive(Default)]
struct ReplicaState {
    objects: HashMap<ObjectKey, Arc<DynamicObject>>,
    /// namespace -> names, kept sorted so listing is deterministic
    by_namespace: BTreeMap<String, BTreeSet<String>>,
    resource_version: String,
}

impl ReplicaState {
    fn upsert(
        &mut self,
        object: DynamicObject,
    ) {
        let key = object.key();
        self.by_namespace
            .entry(key.namespace.clone())
            .or_default()
            .insert(key.name.clone());
        self.objects.insert(key, Arc::new(object));
    }

    fn remove(
        &mut self,
        key: &ObjectKey,
    ) {
        self.objects.remove(key);
        if let Some(names) = self.by_namespace.get_mut(&key.namespace) {
            names.remove(&key.name);
            if names.is_empty() {
                self.by_namespace.remove(&key.namespace);
            }
        }
    }
}

/// In-memory indexed snapshot of every object of one resource type.
///
/// Written only by the owning subscription's run loop; read concurrently by
/// any number of readers.
pub struct LocalIndexedReplica {
    resource_type: ResourceType,
    state: RwLock<ReplicaState>,
    synced: watch::Sender<bool>,
}

impl std::fmt::Debug for LocalIndexedReplica {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LocalIndexedReplica")
            .field("resource_type", &self.resource_type)
            .field("synced", &self.has_synced())
            .finish_non_exhaustive()
    }
}

impl LocalIndexedReplica {
    pub fn new(resource_type: ResourceType) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            resource_type,
            state: RwLock::new(ReplicaState::default()),
            synced,
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn get(
        &self,
        key: &ObjectKey,
    ) -> Option<Arc<DynamicObject>> {
        self.state.read().objects.get(key).cloned()
    }

    /// Objects of `namespace` (all namespaces when `None`) accepted by
    /// `predicate`, in namespace then name order.
    pub fn list<P>(
        &self,
        namespace: Option<&str>,
        predicate: P,
    ) -> Vec<Arc<DynamicObject>>
    where
        P: Fn(&DynamicObject) -> bool,
    {
        let state = self.state.read();
        let lookup = |ns: &String, name: &String| {
            state
                .objects
                .get(&ObjectKey::new(ns.clone(), name.clone()))
                .filter(|obj| predicate(obj))
                .cloned()
        };

        match namespace {
            Some(ns) => state
                .by_namespace
                .get_key_value(ns)
                .map(|(ns, names)| names.iter().filter_map(|name| lookup(ns, name)).collect())
                .unwrap_or_default(),
            None => state
                .by_namespace
                .iter()
                .flat_map(|(ns, names)| names.iter().map(move |name| (ns, name)))
                .filter_map(|(ns, name)| lookup(ns, name))
                .collect(),
        }
    }

    /// True once a listing has been applied and the watch following it is
    /// live. Never reverts.
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Waits until the replica has synced. Returns false if `cancel` fires first.
    pub async fn wait_synced(
        &self,
        cancel: &CancellationToken,
    ) -> bool {
        let mut rx = self.synced.subscribe();
        tokio::select! {
            _ = cancel.cancelled() => self.has_synced(),
            r = rx.wait_for(|synced| *synced) => r.is_ok(),
        }
    }

    /// Resource version the replica reflects.
    pub fn resource_version(&self) -> String {
        self.state.read().resource_version.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the whole content with a fresh listing. Does not touch the
    /// synced flag, see [`mark_synced`](Self::mark_synced).
    pub(crate) fn replace(
        &self,
        list: ObjectList,
    ) {
        let mut fresh = ReplicaState {
            resource_version: list.resource_version,
            ..Default::default()
        };
        for object in list.items {
            fresh.upsert(object);
        }

        let count = fresh.objects.len();
        *self.state.write() = fresh;
        debug!(resource_type = %self.resource_type, count, "replica replaced from listing");
    }

    /// Publishes the synced flag. Returns true only for the call that set it.
    pub(crate) fn mark_synced(&self) -> bool {
        self.synced.send_if_modified(|synced| {
            let changed = !*synced;
            *synced = true;
            changed
        })
    }

    /// Applies one incremental change.
    pub(crate) fn apply(
        &self,
        event: WatchEvent,
    ) {
        let mut state = self.state.write();
        if let Some(rv) = event.resource_version() {
            if !rv.is_empty() {
                state.resource_version = rv.to_string();
            }
        }

        match event {
            WatchEvent::Added(object) | WatchEvent::Modified(object) => {
                trace!(resource_type = %self.resource_type, key = %object.key(), "upsert");
                state.upsert(object);
            }
            WatchEvent::Deleted(object) => {
                trace!(resource_type = %self.resource_type, key = %object.key(), "delete");
                state.remove(&object.key());
            }
            WatchEvent::Bookmark { .. } => {}
            WatchEvent::Expired => {
                debug!(resource_type = %self.resource_type, "expired event is handled by the run loop");
            }
        }
    }
}
