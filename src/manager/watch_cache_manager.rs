use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::jittered_resync_period;
use super::Subscription;
use crate::CacheError;
use crate::CacheReader;
use crate::ConnectorFactory;
use crate::LocalIndexedReplica;
use crate::ReadPolicy;
use crate::ReaderScope;
use crate::ResourceScope;
use crate::ResourceType;
use crate::Result;
use crate::TypeRegistry;
use crate::WatchCacheConfig;

/// What [`WatchCacheManager::get`] hands out for one resource type.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    pub(crate) subscription: Arc<Subscription>,
    reader: CacheReader,
}

impl SubscriptionEntry {
    pub fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }

    pub fn reader(&self) -> &CacheReader {
        &self.reader
    }
}

#[derive(Default)]
pub(crate) struct ManagerState {
    pub(crate) entries: HashMap<ResourceType, SubscriptionEntry>,
    started: bool,
    shutdown: Option<CancellationToken>,
}

/// Registry of lazily created per-type subscriptions.
///
/// At most one subscription exists per resource type, however many callers
/// race on [`get`](Self::get). Subscriptions created before
/// [`start`](Self::start) begin running when it is called; later ones run
/// immediately.
pub struct WatchCacheManager {
    config: WatchCacheConfig,
    factory: Arc<dyn ConnectorFactory>,
    type_registry: Arc<TypeRegistry>,
    pub(crate) state: RwLock<ManagerState>,
    /// Opens once `start` has launched the registered subscriptions
    ready: watch::Sender<bool>,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WatchCacheManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchCacheManager")
            .field("started", &self.is_started())
            .field("resource_types", &self.resource_types())
            .finish_non_exhaustive()
    }
}

impl WatchCacheManager {
    pub fn new(
        config: WatchCacheConfig,
        factory: Arc<dyn ConnectorFactory>,
        type_registry: TypeRegistry,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            config,
            factory,
            type_registry: Arc::new(type_registry),
            state: RwLock::new(ManagerState::default()),
            ready,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WatchCacheConfig {
        &self.config
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    /// Returns the subscription for `resource_type`, creating it on first
    /// use, together with whether the manager had been started.
    ///
    /// When started, waits until the replica has synced; a cancelled `cancel`
    /// ends that wait with [`CacheError::SyncTimeout`]. Connector factory
    /// errors are returned unchanged and nothing is registered, so a later
    /// call retries creation.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        resource_type: &ResourceType,
    ) -> Result<(bool, SubscriptionEntry)> {
        let (started, entry) = match self.lookup(resource_type) {
            Some(found) => found,
            None => self.create(resource_type)?,
        };

        if started && !entry.reader.has_synced() {
            let waiting_since = Instant::now();
            if !entry.subscription.replica().wait_synced(cancel).await {
                return Err(CacheError::SyncTimeout {
                    resource_type: resource_type.clone(),
                    elapsed: waiting_since.elapsed(),
                }
                .into());
            }
        }

        Ok((started, entry))
    }

    fn lookup(
        &self,
        resource_type: &ResourceType,
    ) -> Option<(bool, SubscriptionEntry)> {
        let state = self.state.read();
        state
            .entries
            .get(resource_type)
            .map(|entry| (state.started, entry.clone()))
    }

    fn create(
        &self,
        resource_type: &ResourceType,
    ) -> Result<(bool, SubscriptionEntry)> {
        let mut state = self.state.write();
        // Another caller may have won the race between our read and write locks
        if let Some(entry) = state.entries.get(resource_type) {
            return Ok((state.started, entry.clone()));
        }

        let namespace = match self.type_registry.scope_of(resource_type)? {
            ResourceScope::Namespaced => self.config.manager.namespace.clone(),
            ResourceScope::Cluster => String::new(),
        };

        let connector = self
            .factory
            .create(resource_type, &namespace, &self.type_registry)?;

        let subscription = Arc::new(Subscription::new(
            resource_type.clone(),
            connector,
            jittered_resync_period(self.config.manager.resync_period()),
            self.config.retry.list_watch,
        ));
        let policy = if self.config.manager.require_synced_reads {
            ReadPolicy::RequireSynced
        } else {
            ReadPolicy::AllowStale
        };
        let reader = CacheReader::new(
            subscription.replica().clone(),
            ReaderScope::from_namespace(&namespace),
            policy,
        );
        let entry = SubscriptionEntry { subscription, reader };

        if state.started {
            if let Some(shutdown) = &state.shutdown {
                entry.subscription.launch(shutdown.clone(), &mut self.tasks.lock());
            }
        }

        info!(
            %resource_type,
            namespace = %namespace,
            resync_period = ?entry.subscription.resync_period(),
            started = state.started,
            "subscription registered"
        );
        state.entries.insert(resource_type.clone(), entry.clone());

        Ok((state.started, entry))
    }

    /// Launches every registered subscription, then blocks until `cancel`
    /// fires and all run loops have exited.
    ///
    /// A second call fails with [`CacheError::AlreadyStarted`].
    pub async fn start(
        &self,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut state = self.state.write();
            if state.started {
                return Err(CacheError::AlreadyStarted.into());
            }
            state.started = true;
            state.shutdown = Some(cancel.clone());

            let mut tasks = self.tasks.lock();
            for entry in state.entries.values() {
                entry.subscription.launch(cancel.clone(), &mut tasks);
            }
            info!(subscriptions = state.entries.len(), "watch cache manager started");
        }
        self.ready.send_replace(true);

        cancel.cancelled().await;
        info!("shutdown requested, waiting for subscriptions to stop");

        // Creations launch under the state lock, so once it is taken here any
        // later creation sees the cancelled token and spawns nothing.
        let handles = {
            let _state = self.state.write();
            std::mem::take(&mut *self.tasks.lock())
        };
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("subscription task failed to join: {:?}", e);
            }
        }
        debug!("all subscriptions stopped");
        Ok(())
    }

    /// Waits until the manager is started and every subscription registered
    /// at that moment has synced. False if `cancel` fires first.
    pub async fn wait_for_cache_sync(
        &self,
        cancel: &CancellationToken,
    ) -> bool {
        let mut ready = self.ready.subscribe();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            r = ready.wait_for(|started| *started) => r.is_ok(),
        };
        if !opened {
            return false;
        }

        let replicas: Vec<Arc<LocalIndexedReplica>> = self
            .state
            .read()
            .entries
            .values()
            .map(|entry| entry.subscription.replica().clone())
            .collect();

        for replica in replicas {
            if !replica.wait_synced(cancel).await {
                return false;
            }
        }
        true
    }

    pub fn is_started(&self) -> bool {
        self.state.read().started
    }

    /// Registered resource types, sorted.
    pub fn resource_types(&self) -> Vec<ResourceType> {
        let mut types: Vec<_> = self.state.read().entries.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
