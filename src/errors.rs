//! Watch Cache Error Hierarchy
//!
//! Defines the error types of the watch cache, categorized by the layer that
//! produces them: configuration, the local cache (registry, replica, readers)
//! and the list/watch connector collaborator.

use std::time::Duration;

use config::ConfigError;

use crate::ObjectKey;
use crate::ResourceType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local cache failures (lookups, sync waits, registry lifecycle)
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// List/watch collaborator failures
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True when the error means "object does not exist".
    ///
    /// This is the only error class on which [`crate::CompositeClient`]
    /// falls back to the direct source.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Cache(CacheError::NotFound { .. }))
    }

    /// True when a caller gave up waiting for a replica to sync.
    pub fn is_sync_timeout(&self) -> bool {
        matches!(self, Error::Cache(CacheError::SyncTimeout { .. }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Object is absent from the replica or the direct source
    #[error("{resource_type} {key} not found")]
    NotFound { resource_type: ResourceType, key: ObjectKey },

    /// Read issued before the initial listing completed
    #[error("cache for {resource_type} has not synced yet")]
    NotSynced { resource_type: ResourceType },

    /// Caller's cancellation fired while waiting for sync
    #[error("timed out waiting for cache of {resource_type} to sync after {elapsed:?}")]
    SyncTimeout {
        resource_type: ResourceType,
        elapsed: Duration,
    },

    /// Resource type missing from the type registry
    #[error("resource type {0} is not registered")]
    UnknownResourceType(ResourceType),

    /// Listing a namespace the reader is not scoped to
    #[error("namespace {namespace:?} is outside the cache scope {scope:?}")]
    NamespaceOutOfScope { namespace: String, scope: String },

    /// `start` called on a manager that already started
    #[error("watch cache manager already started")]
    AlreadyStarted,

    /// Object data could not be decoded into the requested type
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: ObjectKey,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Connector factory refused to build a connector
    #[error("failed to create connector for {resource_type}: {reason}")]
    FactoryFailed {
        resource_type: ResourceType,
        reason: String,
    },

    /// Initial (or re-) listing failed
    #[error("list {resource_type} failed: {reason}")]
    ListFailed {
        resource_type: ResourceType,
        reason: String,
    },

    /// Watch call or watch stream failed
    #[error("watch {resource_type} failed: {reason}")]
    WatchFailed {
        resource_type: ResourceType,
        reason: String,
    },

    /// Watch stream ended without an explicit relist request
    #[error("watch stream of {0} closed")]
    WatchClosed(ResourceType),

    /// A single attempt exceeded its timeout
    #[error("Retry timeout after {0:?}")]
    RetryTimeout(Duration),

    /// Retry policy exhaustion
    #[error("Task failed after {0} retries")]
    RetryExhausted(usize),

    /// Shutdown requested while the operation was in flight
    #[error("operation cancelled")]
    Cancelled,
}
