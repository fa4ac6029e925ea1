use std::time::Duration;

use d_watch_cache::DynamicObject;
use d_watch_cache::InMemorySource;
use d_watch_cache::ListOptions;
use d_watch_cache::ObjectKey;
use d_watch_cache::SubscriptionState;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::bar;
use crate::common::enable_logger;
use crate::common::eventually;
use crate::common::foo;
use crate::common::new_manager;
use crate::common::start_manager;
use crate::common::test_config;
use crate::common::WAIT_FOR_SYNC;

#[tokio::test]
async fn test_empty_type_registered_before_start_syncs_to_empty_list() {
    enable_logger();
    let source = InMemorySource::new();
    let manager = new_manager(&source, test_config());

    let (started, entry) = manager.get(&CancellationToken::new(), &foo()).await.unwrap();
    assert!(!started);

    let running = start_manager(manager.clone());
    assert!(timeout(WAIT_FOR_SYNC, manager.wait_for_cache_sync(&CancellationToken::new()))
        .await
        .unwrap());

    assert!(entry.reader().has_synced());
    assert!(entry.reader().list(&ListOptions::default()).unwrap().is_empty());

    running.stop().await;
    assert_eq!(entry.subscription().state(), SubscriptionState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_first_gets_share_one_subscription() {
    enable_logger();
    let source = InMemorySource::new();
    let manager = new_manager(&source, test_config());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get(&CancellationToken::new(), &bar()).await })
    };
    let second = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get(&CancellationToken::new(), &bar()).await })
    };
    let (_, a) = first.await.unwrap().unwrap();
    let (_, b) = second.await.unwrap().unwrap();

    assert_eq!(source.connector_creations(), 1);
    assert!(std::sync::Arc::ptr_eq(a.subscription(), b.subscription()));
    assert!(a.reader().has_synced());

    running.stop().await;
}

#[tokio::test]
async fn test_replica_follows_source_changes() {
    enable_logger();
    let source = InMemorySource::new();
    source.apply(&foo(), DynamicObject::new("prod", "a"));
    let manager = new_manager(&source, test_config());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);

    let (_, entry) = manager.get(&CancellationToken::new(), &foo()).await.unwrap();
    let reader = entry.reader().clone();
    assert_eq!(reader.list(&ListOptions::default()).unwrap().len(), 1);

    source.apply(&foo(), DynamicObject::new("prod", "b").with_label("tier", "web"));
    source.delete(&foo(), &ObjectKey::new("prod", "a"));
    assert!(
        eventually(WAIT_FOR_SYNC, || {
            reader
                .list(&ListOptions::default())
                .map(|items| items.len() == 1 && items[0].meta.name == "b")
                .unwrap_or(false)
        })
        .await
    );
    let web = reader.list(&ListOptions::default().with_label("tier", "web")).unwrap();
    assert_eq!(web.len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_expired_watch_recovers_through_relist() {
    enable_logger();
    let source = InMemorySource::with_history_capacity(2);
    let manager = new_manager(&source, test_config());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);
    let (_, entry) = manager.get(&CancellationToken::new(), &foo()).await.unwrap();
    let replica = entry.subscription().replica().clone();

    // A delivered change proves the watch is live before it is expired.
    source.apply(&foo(), DynamicObject::new("prod", "first"));
    assert!(eventually(WAIT_FOR_SYNC, || replica.len() == 1).await);

    source.expire_watches(&foo());
    for i in 0..10 {
        source.apply(&foo(), DynamicObject::new("prod", format!("obj-{i}")));
    }

    assert!(eventually(WAIT_FOR_SYNC, || replica.len() == 11).await);
    assert!(source.list_calls() >= 2);

    running.stop().await;
}

#[tokio::test]
async fn test_transient_failures_do_not_surface_to_callers() {
    enable_logger();
    let source = InMemorySource::new();
    source.apply(&foo(), DynamicObject::new("prod", "a"));
    source.fail_next_lists(2);
    source.fail_next_watches(2);
    let manager = new_manager(&source, test_config());
    let running = start_manager(manager.clone());
    assert!(eventually(WAIT_FOR_SYNC, || manager.is_started()).await);

    let (_, entry) = timeout(WAIT_FOR_SYNC, manager.get(&CancellationToken::new(), &foo()))
        .await
        .unwrap()
        .unwrap();

    assert!(entry.reader().get(&ObjectKey::new("prod", "a")).is_ok());
    running.stop().await;
}

#[tokio::test]
async fn test_wait_for_cache_sync_honours_cancellation() {
    let source = InMemorySource::new();
    let manager = new_manager(&source, test_config());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    // Never started, so only cancellation can end the wait.
    assert!(!timeout(WAIT_FOR_SYNC, manager.wait_for_cache_sync(&cancel)).await.unwrap());
}
