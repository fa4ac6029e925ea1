use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::LocalIndexedReplica;
use crate::CacheError;
use crate::DynamicObject;
use crate::Error;
use crate::ListOptions;
use crate::ObjectKey;
use crate::Result;

/// Which part of the replica a reader may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderScope {
    ClusterWide,
    Namespace(String),
}

impl ReaderScope {
    /// Empty namespace means cluster-wide.
    pub fn from_namespace(namespace: &str) -> Self {
        if namespace.is_empty() {
            ReaderScope::ClusterWide
        } else {
            ReaderScope::Namespace(namespace.to_string())
        }
    }

    fn admits(
        &self,
        namespace: &str,
    ) -> bool {
        match self {
            ReaderScope::ClusterWide => true,
            ReaderScope::Namespace(ns) => ns == namespace,
        }
    }
}

/// How reads behave before the first listing landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Fail with [`CacheError::NotSynced`]
    RequireSynced,
    /// Serve whatever the replica holds
    AllowStale,
}

/// Thin scoped view over a [`LocalIndexedReplica`]. Never touches the network.
#[derive(Debug, Clone)]
pub struct CacheReader {
    replica: Arc<LocalIndexedReplica>,
    scope: ReaderScope,
    policy: ReadPolicy,
}

impl CacheReader {
    pub fn new(
        replica: Arc<LocalIndexedReplica>,
        scope: ReaderScope,
        policy: ReadPolicy,
    ) -> Self {
        Self { replica, scope, policy }
    }

    pub fn scope(&self) -> &ReaderScope {
        &self.scope
    }

    pub fn replica(&self) -> &Arc<LocalIndexedReplica> {
        &self.replica
    }

    pub fn has_synced(&self) -> bool {
        self.replica.has_synced()
    }

    /// Point lookup. Keys outside a namespace-restricted scope are reported
    /// as not found.
    pub fn get(
        &self,
        key: &ObjectKey,
    ) -> Result<Arc<DynamicObject>> {
        self.ensure_readable()?;

        if !self.scope.admits(&key.namespace) {
            return Err(self.not_found(key));
        }

        self.replica.get(key).ok_or_else(|| self.not_found(key))
    }

    /// Typed point lookup.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        key: &ObjectKey,
    ) -> Result<T> {
        let object = self.get(key)?;
        object.decode().map_err(|source| {
            Error::from(CacheError::Decode {
                key: key.clone(),
                source,
            })
        })
    }

    pub fn list(
        &self,
        options: &ListOptions,
    ) -> Result<Vec<Arc<DynamicObject>>> {
        self.ensure_readable()?;

        let namespace = match (&self.scope, options.namespace.as_deref()) {
            (ReaderScope::ClusterWide, ns) => ns,
            (ReaderScope::Namespace(scoped), None) => Some(scoped.as_str()),
            (ReaderScope::Namespace(scoped), Some(ns)) if scoped == ns => Some(ns),
            (ReaderScope::Namespace(scoped), Some(ns)) => {
                return Err(CacheError::NamespaceOutOfScope {
                    namespace: ns.to_string(),
                    scope: scoped.clone(),
                }
                .into())
            }
        };

        Ok(self
            .replica
            .list(namespace, |obj| options.label_selector.matches(&obj.meta.labels)))
    }

    /// Typed listing; fails on the first object that does not decode.
    pub fn list_as<T: DeserializeOwned>(
        &self,
        options: &ListOptions,
    ) -> Result<Vec<T>> {
        self.list(options)?
            .iter()
            .map(|object| {
                object.decode().map_err(|source| {
                    Error::from(CacheError::Decode {
                        key: object.key(),
                        source,
                    })
                })
            })
            .collect()
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.policy == ReadPolicy::RequireSynced && !self.replica.has_synced() {
            return Err(CacheError::NotSynced {
                resource_type: self.replica.resource_type().clone(),
            }
            .into());
        }
        Ok(())
    }

    fn not_found(
        &self,
        key: &ObjectKey,
    ) -> Error {
        CacheError::NotFound {
            resource_type: self.replica.resource_type().clone(),
            key: key.clone(),
        }
        .into()
    }
}
