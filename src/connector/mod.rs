//! List/watch collaborator boundary.
//!
//! The embedding system supplies a [`ConnectorFactory`] that, given a resource
//! type and a namespace scope, builds a [`ListWatchConnector`]: one call for a
//! full listing, one for the incremental change stream that follows it.
//! [`InMemorySource`] is the in-process reference implementation.

mod memory;
pub use memory::*;


use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::ObjectList;
use crate::ResourceType;
use crate::Result;
use crate::TypeRegistry;
use crate::WatchEvent;

/// Incremental change stream returned by [`ListWatchConnector::watch`].
///
/// An `Err` item or the end of the stream makes the subscription back off and
/// relist.
pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ListWatchConnector: Send + Sync + 'static {
    /// Full snapshot of every object in scope.
    async fn list(&self) -> Result<ObjectList>;

    /// Changes strictly after `resource_version`.
    async fn watch(
        &self,
        resource_version: &str,
    ) -> Result<WatchStream>;
}

#[cfg_attr(test, automock)]
pub trait ConnectorFactory: Send + Sync + 'static {
    /// Builds a connector for one resource type.
    ///
    /// `namespace` is empty for cluster-wide scope. A failure here is the only
    /// subscription failure visible to [`crate::WatchCacheManager::get`]
    /// callers.
    fn create(
        &self,
        resource_type: &ResourceType,
        namespace: &str,
        type_registry: &TypeRegistry,
    ) -> Result<Arc<dyn ListWatchConnector>>;
}
