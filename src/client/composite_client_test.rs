use std::sync::Arc;

use super::*;
use crate::test_utils::object;
use crate::test_utils::widgets;
use crate::CacheError;
use crate::ConnectorError;
use crate::Error;
use crate::ListOptions;
use crate::ManagerConfig;
use crate::ObjectKey;

fn not_found(key: &ObjectKey) -> Error {
    CacheError::NotFound {
        resource_type: widgets(),
        key: key.clone(),
    }
    .into()
}

fn client(
    cache: MockObjectReader,
    direct: MockObjectReader,
    raw_listing: bool,
) -> CompositeClient {
    CompositeClient::new(Arc::new(cache), Arc::new(direct), raw_listing)
}

#[tokio::test]
async fn test_get_served_from_cache_never_touches_source() {
    let mut cache = MockObjectReader::new();
    cache
        .expect_get()
        .times(1)
        .returning(|_, key| Ok(object(&key.namespace, &key.name)));
    let mut direct = MockObjectReader::new();
    direct.expect_get().never();

    let found = client(cache, direct, false)
        .get(&widgets(), &ObjectKey::new("prod", "a"))
        .await
        .unwrap();

    assert_eq!(found.key(), ObjectKey::new("prod", "a"));
}

#[tokio::test]
async fn test_cache_not_found_falls_back_exactly_once() {
    let mut cache = MockObjectReader::new();
    cache.expect_get().times(1).returning(|_, key| Err(not_found(key)));
    let mut direct = MockObjectReader::new();
    direct
        .expect_get()
        .times(1)
        .returning(|_, key| Ok(object(&key.namespace, &key.name).with_resource_version("9")));

    let found = client(cache, direct, false)
        .get(&widgets(), &ObjectKey::new("prod", "fresh"))
        .await
        .unwrap();

    assert_eq!(found.resource_version(), "9");
}

#[tokio::test]
async fn test_fallback_result_is_returned_verbatim() {
    let mut cache = MockObjectReader::new();
    cache.expect_get().times(1).returning(|_, key| Err(not_found(key)));
    let mut direct = MockObjectReader::new();
    direct.expect_get().times(1).returning(|_, key| Err(not_found(key)));

    let err = client(cache, direct, false)
        .get(&widgets(), &ObjectKey::new("prod", "gone"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_other_cache_errors_skip_fallback() {
    let mut cache = MockObjectReader::new();
    cache.expect_get().times(1).returning(|rt, _| {
        Err(CacheError::NotSynced {
            resource_type: rt.clone(),
        }
        .into())
    });
    let mut direct = MockObjectReader::new();
    direct.expect_get().never();

    let err = client(cache, direct, false)
        .get(&widgets(), &ObjectKey::new("prod", "a"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cache(CacheError::NotSynced { .. })));
}

#[tokio::test]
async fn test_transport_errors_skip_fallback() {
    let mut cache = MockObjectReader::new();
    cache.expect_get().times(1).returning(|rt, _| {
        Err(ConnectorError::ListFailed {
            resource_type: rt.clone(),
            reason: "backend unavailable".to_string(),
        }
        .into())
    });
    let mut direct = MockObjectReader::new();
    direct.expect_get().never();

    let err = client(cache, direct, false)
        .get(&widgets(), &ObjectKey::new("prod", "a"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connector(ConnectorError::ListFailed { .. })));
}

#[tokio::test]
async fn test_cached_listing_never_invokes_source() {
    let mut cache = MockObjectReader::new();
    cache.expect_list().times(1).returning(|_, _| Ok(vec![]));
    let mut direct = MockObjectReader::new();
    direct.expect_list().never();

    let listed = client(cache, direct, false)
        .list(&widgets(), &ListOptions::default())
        .await
        .unwrap();

    // Empty is final, no fallback.
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_raw_listing_never_invokes_cache() {
    let mut cache = MockObjectReader::new();
    cache.expect_list().never();
    let mut direct = MockObjectReader::new();
    direct
        .expect_list()
        .times(1)
        .returning(|_, _| Ok(vec![object("prod", "a"), object("prod", "b")]));

    let listed = client(cache, direct, true)
        .list(&widgets(), &ListOptions::in_namespace("prod"))
        .await
        .unwrap();

    assert_eq!(listed.len(), 2);
}

#[test]
fn test_from_config_reads_raw_listing_flag() {
    let config = ManagerConfig {
        raw_listing: true,
        ..Default::default()
    };

    let composite = CompositeClient::from_config(
        Arc::new(MockObjectReader::new()),
        Arc::new(MockObjectReader::new()),
        &config,
    );

    assert!(composite.raw_listing());
}
