use std::sync::Arc;

use d_watch_cache::CacheClient;
use d_watch_cache::CompositeClient;
use d_watch_cache::DynamicObject;
use d_watch_cache::InMemorySource;
use d_watch_cache::ListOptions;
use d_watch_cache::ObjectKey;
use d_watch_cache::ObjectReader;
use serde::Deserialize;
use serde_json::json;

use crate::common::enable_logger;
use crate::common::eventually;
use crate::common::foo;
use crate::common::new_manager;
use crate::common::start_manager;
use crate::common::test_config;
use crate::common::WAIT_FOR_SYNC;

#[derive(Debug, Deserialize, PartialEq)]
struct FooSpec {
    size: u32,
}

#[tokio::test]
async fn test_out_of_scope_get_falls_back_to_source() {
    enable_logger();
    let source = InMemorySource::new();
    source.apply(&foo(), DynamicObject::new("prod", "a"));
    source.apply(&foo(), DynamicObject::new("dev", "b"));
    let mut config = test_config();
    config.manager.namespace = "prod".to_string();
    let manager = new_manager(&source, config.clone());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);

    let client = CompositeClient::from_config(
        Arc::new(CacheClient::new(manager.clone())),
        Arc::new(source.clone()),
        &config.manager,
    );

    let cached = client.get(&foo(), &ObjectKey::new("prod", "a")).await.unwrap();
    assert_eq!(cached.meta.name, "a");

    let fetched = client.get(&foo(), &ObjectKey::new("dev", "b")).await.unwrap();
    assert_eq!(fetched.meta.namespace, "dev");

    let missing = client.get(&foo(), &ObjectKey::new("dev", "nope")).await.unwrap_err();
    assert!(missing.is_not_found());

    running.stop().await;
}

#[tokio::test]
async fn test_listing_source_follows_raw_listing_flag() {
    enable_logger();
    let source = InMemorySource::new();
    source.apply(&foo(), DynamicObject::new("prod", "a"));
    source.apply(&foo(), DynamicObject::new("dev", "b"));
    let mut config = test_config();
    config.manager.namespace = "prod".to_string();
    let manager = new_manager(&source, config.clone());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);
    let cache = Arc::new(CacheClient::new(manager.clone()));

    let cached = CompositeClient::new(cache.clone(), Arc::new(source.clone()), false);
    assert_eq!(cached.list(&foo(), &ListOptions::default()).await.unwrap().len(), 1);

    let raw = CompositeClient::new(cache, Arc::new(source.clone()), true);
    assert_eq!(raw.list(&foo(), &ListOptions::default()).await.unwrap().len(), 2);

    running.stop().await;
}

#[tokio::test]
async fn test_typed_reads_through_the_reader() {
    enable_logger();
    let source = InMemorySource::new();
    source.apply(&foo(), DynamicObject::new("prod", "a").with_data(json!({ "size": 3 })));
    let manager = new_manager(&source, test_config());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);

    let (_, entry) = manager
        .get(&tokio_util::sync::CancellationToken::new(), &foo())
        .await
        .unwrap();
    let decoded: FooSpec = entry.reader().get_as(&ObjectKey::new("prod", "a")).unwrap();
    assert_eq!(decoded, FooSpec { size: 3 });

    running.stop().await;
}
