use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use d_watch_cache::BackoffPolicy;
use d_watch_cache::InMemorySource;
use d_watch_cache::ResourceScope;
use d_watch_cache::ResourceType;
use d_watch_cache::TypeRegistry;
use d_watch_cache::WatchCacheConfig;
use d_watch_cache::WatchCacheManager;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const WAIT_FOR_SYNC: Duration = Duration::from_secs(5);

static LOGGER: Once = Once::new();

pub fn enable_logger() {
    LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn foo() -> ResourceType {
    ResourceType::new("demo.example.io", "v1", "Foo")
}

pub fn bar() -> ResourceType {
    ResourceType::new("demo.example.io", "v1", "Bar")
}

pub fn registry() -> TypeRegistry {
    TypeRegistry::new()
        .with(foo(), ResourceScope::Namespaced)
        .with(bar(), ResourceScope::Namespaced)
}

pub fn test_config() -> WatchCacheConfig {
    let mut config = WatchCacheConfig::default();
    config.manager.sync_timeout_ms = 3_000;
    config.retry.list_watch = BackoffPolicy {
        max_retries: 0,
        timeout_ms: 1_000,
        base_delay_ms: 5,
        max_delay_ms: 50,
    };
    config
}

pub struct RunningCache {
    pub manager: Arc<WatchCacheManager>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<d_watch_cache::Result<()>>,
}

impl RunningCache {
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

pub fn start_manager(manager: Arc<WatchCacheManager>) -> RunningCache {
    let shutdown = CancellationToken::new();
    let handle = {
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { manager.start(&shutdown).await })
    };
    RunningCache {
        manager,
        shutdown,
        handle,
    }
}

pub fn new_manager(
    source: &InMemorySource,
    config: WatchCacheConfig,
) -> Arc<WatchCacheManager> {
    Arc::new(WatchCacheManager::new(config, Arc::new(source.clone()), registry()))
}

pub async fn eventually<F>(
    within: Duration,
    condition: F,
) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
