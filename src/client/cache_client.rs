use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ObjectReader;
use crate::CacheError;
use crate::CacheReader;
use crate::DynamicObject;
use crate::ListOptions;
use crate::ObjectKey;
use crate::ResourceType;
use crate::Result;
use crate::WatchCacheManager;

/// [`ObjectReader`] served from the manager's replicas.
///
/// The first read of a type registers its subscription. Once the manager is
/// started, reads wait for the replica to sync for at most `sync_timeout`.
#[derive(Debug, Clone)]
pub struct CacheClient {
    manager: Arc<WatchCacheManager>,
    sync_timeout: Duration,
}

impl CacheClient {
    pub fn new(manager: Arc<WatchCacheManager>) -> Self {
        let sync_timeout = manager.config().manager.sync_timeout();
        Self { manager, sync_timeout }
    }

    pub fn with_sync_timeout(
        mut self,
        sync_timeout: Duration,
    ) -> Self {
        self.sync_timeout = sync_timeout;
        self
    }

    pub fn manager(&self) -> &Arc<WatchCacheManager> {
        &self.manager
    }

    pub fn sync_timeout(&self) -> Duration {
        self.sync_timeout
    }

    async fn reader(
        &self,
        resource_type: &ResourceType,
    ) -> Result<CacheReader> {
        let cancel = CancellationToken::new();
        match timeout(self.sync_timeout, self.manager.get(&cancel, resource_type)).await {
            Ok(entry) => entry.map(|(_, entry)| entry.reader().clone()),
            Err(_) => {
                debug!(%resource_type, timeout = ?self.sync_timeout, "gave up waiting for cache sync");
                Err(CacheError::SyncTimeout {
                    resource_type: resource_type.clone(),
                    elapsed: self.sync_timeout,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl ObjectReader for CacheClient {
    async fn get(
        &self,
        resource_type: &ResourceType,
        key: &ObjectKey,
    ) -> Result<DynamicObject> {
        let reader = self.reader(resource_type).await?;
        reader.get(key).map(|object| object.as_ref().clone())
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>> {
        let reader = self.reader(resource_type).await?;
        Ok(reader
            .list(options)?
            .into_iter()
            .map(|object| object.as_ref().clone())
            .collect())
    }
}
