use std::sync::Arc;
use std::time::Duration;

use d_watch_cache::CacheBasedEventHandler;
use d_watch_cache::ChangeNotification;
use d_watch_cache::DynamicObject;
use d_watch_cache::ObjectKey;
use d_watch_cache::QueueConfig;
use d_watch_cache::RateLimitingQueue;
use d_watch_cache::ResourceVersionDetector;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;

fn versioned(
    name: &str,
    version: &str,
) -> ChangeNotification {
    DynamicObject::new("prod", name).with_resource_version(version).into()
}

#[tokio::test]
async fn test_notifications_flow_into_work_queue() {
    enable_logger();
    let queue = RateLimitingQueue::from_config(&QueueConfig::default());
    let handler = Arc::new(CacheBasedEventHandler::new(
        Arc::new(ResourceVersionDetector::new()),
        Arc::new(queue.clone()),
    ));
    let (tx, rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();
    let worker = {
        let handler = handler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { handler.run(rx, cancel).await })
    };

    tx.send(versioned("a", "1")).await.unwrap();
    tx.send(versioned("a", "1")).await.unwrap();
    tx.send(ChangeNotification::empty()).await.unwrap();
    tx.send(versioned("b", "2")).await.unwrap();
    drop(tx);
    timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();

    assert_eq!(handler.enqueued(), 2);
    assert_eq!(handler.dropped(), 1);
    assert_eq!(queue.get().await, Some(ObjectKey::new("prod", "a")));
    assert_eq!(queue.get().await, Some(ObjectKey::new("prod", "b")));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_failed_item_is_retried_with_backoff() {
    enable_logger();
    let queue = RateLimitingQueue::from_config(&QueueConfig {
        base_delay_ms: 5,
        max_delay_ms: 50,
    });
    queue.add(ObjectKey::new("prod", "flaky"));

    let key = queue.get().await.unwrap();
    queue.add_rate_limited(key.clone());
    queue.done(&key);

    let retried = timeout(Duration::from_secs(1), queue.get()).await.unwrap();
    assert_eq!(retried, Some(key.clone()));
    assert_eq!(queue.num_requeues(&key), 1);

    queue.forget(&key);
    queue.done(&key);
    queue.shut_down();
    assert_eq!(queue.get().await, None);
}
