use std::sync::Once;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;

use crate::BackoffPolicy;
use crate::DynamicObject;
use crate::ResourceScope;
use crate::ResourceType;
use crate::TypeRegistry;
use crate::WatchCacheConfig;

static LOGGER: Once = Once::new();

pub fn enable_logger() {
    LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn widgets() -> ResourceType {
    ResourceType::new("apps.example.io", "v1", "Widget")
}

pub fn gadgets() -> ResourceType {
    ResourceType::new("apps.example.io", "v1", "Gadget")
}

pub fn nodes() -> ResourceType {
    ResourceType::new("", "v1", "Node")
}

pub fn type_registry() -> TypeRegistry {
    TypeRegistry::new()
        .with(widgets(), ResourceScope::Namespaced)
        .with(gadgets(), ResourceScope::Namespaced)
        .with(nodes(), ResourceScope::Cluster)
}

pub fn object(
    namespace: &str,
    name: &str,
) -> DynamicObject {
    DynamicObject::new(namespace, name)
}

/// Config with short backoffs so failure paths finish quickly in tests.
pub fn fast_config() -> WatchCacheConfig {
    let mut config = WatchCacheConfig::default();
    config.manager.sync_timeout_ms = 2_000;
    config.retry.list_watch = BackoffPolicy {
        max_retries: 0,
        timeout_ms: 1_000,
        base_delay_ms: 5,
        max_delay_ms: 50,
    };
    config.queue.base_delay_ms = 5;
    config.queue.max_delay_ms = 100;
    config
}

/// Polls `condition` until it holds or `within` elapses.
pub async fn eventually<F>(
    within: Duration,
    condition: F,
) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
