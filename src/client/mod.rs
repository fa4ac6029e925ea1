//! Read API over the cache and the uncached source.

mod cache_client;
mod composite_client;

pub use cache_client::*;
pub use composite_client::*;

#[cfg(test)]
mod composite_client_test;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::DynamicObject;
use crate::ListOptions;
use crate::ObjectKey;
use crate::ResourceType;
use crate::Result;

/// Generic key-value read API shared by the cached and direct sources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectReader: Send + Sync + 'static {
    async fn get(
        &self,
        resource_type: &ResourceType,
        key: &ObjectKey,
    ) -> Result<DynamicObject>;

    async fn list(
        &self,
        resource_type: &ResourceType,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>>;
}
