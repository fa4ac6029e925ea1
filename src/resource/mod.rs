//! Data model shared by every layer of the watch cache.
//!
//! Objects are kept in a dynamic shape ([`DynamicObject`]): identity and
//! versioning metadata are typed, the payload is an opaque JSON document. A
//! typed view is obtained through serde (see [`crate::CacheReader::get_as`]).

mod selector;
mod type_registry;

pub use selector::*;
pub use type_registry::*;


use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

/// Identifies "what kind of thing" is watched: `(group, version, kind)`.
///
/// Used as the registry key of [`crate::WatchCacheManager`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}, Kind={}", self.version, self.kind)
        } else {
            write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
        }
    }
}

/// Primary key of an object: `(namespace, name)`.
///
/// Cluster-scoped objects carry an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new("", name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Opaque version assigned by the source on every change
    #[serde(default)]
    pub resource_version: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// An object of any resource type, as held by the replica.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    pub meta: ObjectMeta,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl DynamicObject {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            meta: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(
        mut self,
        data: serde_json::Value,
    ) -> Self {
        self.data = data;
        self
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.meta.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_version(
        mut self,
        resource_version: impl Into<String>,
    ) -> Self {
        self.meta.resource_version = resource_version.into();
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.meta.namespace.clone(), self.meta.name.clone())
    }

    /// An object without a name cannot be addressed and is treated as
    /// carrying no identity.
    pub fn has_identity(&self) -> bool {
        !self.meta.name.is_empty()
    }

    pub fn resource_version(&self) -> &str {
        &self.meta.resource_version
    }

    /// Decodes the payload into a caller supplied type.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

/// Result of a full listing: the items plus the version the listing
/// reflects. Watches resume from that version.
#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    pub items: Vec<DynamicObject>,
    pub resource_version: String,
}

/// Incremental change delivered by a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(DynamicObject),
    Modified(DynamicObject),
    Deleted(DynamicObject),
    /// Progress marker: no object changed, but the stream has advanced
    Bookmark { resource_version: String },
    /// The requested version is no longer available; the watcher must relist
    Expired,
}

impl WatchEvent {
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                Some(obj.resource_version())
            }
            WatchEvent::Bookmark { resource_version } => Some(resource_version),
            WatchEvent::Expired => None,
        }
    }
}
