use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;

use crate::DynamicObject;
use crate::ObjectKey;

/// Decides whether a notification carries state not yet acted upon.
///
/// Implementations are called concurrently and must serialize the
/// read-modify-write for one key, so that a single change is reported as a
/// miss at most once.
#[cfg_attr(test, automock)]
pub trait CacheMissDetector: Send + Sync + 'static {
    /// True if `object` is unseen or changed since last recorded.
    fn cache_miss(
        &self,
        object: &DynamicObject,
    ) -> bool;

    /// Drops what was recorded for `key`; its next notification is a miss.
    fn forget(
        &self,
        _key: &ObjectKey,
    ) {
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Marker {
    Version(String),
    /// Fingerprint of labels and data, for objects without a resource version
    Content(u64),
}

impl Marker {
    fn of(object: &DynamicObject) -> Self {
        let version = object.resource_version();
        if !version.is_empty() {
            return Marker::Version(version.to_string());
        }

        let mut hasher = DefaultHasher::new();
        object.meta.labels.hash(&mut hasher);
        object.data.to_string().hash(&mut hasher);
        Marker::Content(hasher.finish())
    }
}

/// Remembers the last resource version seen per object key.
#[derive(Debug, Default)]
pub struct ResourceVersionDetector {
    seen: DashMap<ObjectKey, Marker>,
}

impl ResourceVersionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl CacheMissDetector for ResourceVersionDetector {
    fn cache_miss(
        &self,
        object: &DynamicObject,
    ) -> bool {
        let marker = Marker::of(object);
        // The entry holds the shard lock for the whole compare-and-set
        match self.seen.entry(object.key()) {
            Entry::Occupied(mut seen) if *seen.get() != marker => {
                seen.insert(marker);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(marker);
                true
            }
        }
    }

    fn forget(
        &self,
        key: &ObjectKey,
    ) {
        self.seen.remove(key);
    }
}
