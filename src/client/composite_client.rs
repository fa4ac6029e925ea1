use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::ObjectReader;
use crate::DynamicObject;
use crate::ListOptions;
use crate::ManagerConfig;
use crate::ObjectKey;
use crate::ResourceType;
use crate::Result;

/// Reads through the cache, falling back to the direct source only for
/// objects the cache does not hold.
///
/// Listing goes to exactly one source, chosen at construction by
/// `raw_listing`. An empty list is a final answer.
#[derive(Clone)]
pub struct CompositeClient {
    cache: Arc<dyn ObjectReader>,
    direct: Arc<dyn ObjectReader>,
    raw_listing: bool,
}

impl std::fmt::Debug for CompositeClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CompositeClient")
            .field("raw_listing", &self.raw_listing)
            .finish_non_exhaustive()
    }
}

impl CompositeClient {
    pub fn new(
        cache: Arc<dyn ObjectReader>,
        direct: Arc<dyn ObjectReader>,
        raw_listing: bool,
    ) -> Self {
        Self {
            cache,
            direct,
            raw_listing,
        }
    }

    pub fn from_config(
        cache: Arc<dyn ObjectReader>,
        direct: Arc<dyn ObjectReader>,
        config: &ManagerConfig,
    ) -> Self {
        Self::new(cache, direct, config.raw_listing)
    }

    pub fn raw_listing(&self) -> bool {
        self.raw_listing
    }
}

#[async_trait]
impl ObjectReader for CompositeClient {
    async fn get(
        &self,
        resource_type: &ResourceType,
        key: &ObjectKey,
    ) -> Result<DynamicObject> {
        match self.cache.get(resource_type, key).await {
            Err(e) if e.is_not_found() => {
                debug!(%resource_type, %key, "not in cache, reading from source");
                self.direct.get(resource_type, key).await
            }
            cached => cached,
        }
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>> {
        if self.raw_listing {
            self.direct.list(resource_type, options).await
        } else {
            self.cache.list(resource_type, options).await
        }
    }
}
