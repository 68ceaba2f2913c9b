//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis存储和消息代理集成测试，Redis不可用时跳过

#[path = "../common/mod.rs"]
mod common;

use anycache::backend::{GroupConfig, RedisStore, Store};
use anycache::broker::{Broker, MessageHandler};
use anycache::config::RedisConfig;
use anycache::error::CacheError;
use anycache::{GroupBuilder, Subscription};
use common::{eventually, is_redis_available, redis_url, setup_logging, unique_name};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

macro_rules! require_redis {
    ($name:expr) => {
        if !is_redis_available().await {
            println!("Skipping {}: Redis not available", $name);
            return;
        }
    };
}

#[tokio::test]
async fn test_basic_operations() {
    setup_logging();
    require_redis!("test_basic_operations");

    let store = RedisStore::connect(&redis_url()).await.unwrap();
    let group = unique_name("redis_basic");
    store
        .configure_group(&group, GroupConfig::default().with_ttl(Duration::from_secs(30)))
        .await
        .unwrap();

    let gk = store.key(&group, "1");
    assert_eq!(gk.store_key, format!("{}:1", group));
    assert_eq!(store.get(&gk).await.unwrap(), None);

    store.set(&gk, b"payload".to_vec()).await.unwrap();
    assert_eq!(store.get(&gk).await.unwrap(), Some(b"payload".to_vec()));

    store.del(&gk).await.unwrap();
    assert_eq!(store.get(&gk).await.unwrap(), None);
}

#[tokio::test]
async fn test_clear_removes_group_keys_only() {
    setup_logging();
    require_redis!("test_clear_removes_group_keys_only");

    let store = RedisStore::connect(&redis_url()).await.unwrap();
    let group = unique_name("redis_clear");
    let other = unique_name("redis_keep");
    for name in [&group, &other] {
        store
            .configure_group(name, GroupConfig::default().with_ttl(Duration::from_secs(30)))
            .await
            .unwrap();
    }

    for i in 0..25 {
        store
            .set(&store.key(&group, &i.to_string()), vec![i as u8])
            .await
            .unwrap();
    }
    let kept = store.key(&other, "0");
    store.set(&kept, b"keep".to_vec()).await.unwrap();

    store.clear(&group).await.unwrap();
    for i in 0..25 {
        assert_eq!(store.get(&store.key(&group, &i.to_string())).await.unwrap(), None);
    }
    assert_eq!(store.get(&kept).await.unwrap(), Some(b"keep".to_vec()));
    store.del(&kept).await.unwrap();
}

#[tokio::test]
async fn test_cost_hint_is_rejected_at_build() {
    setup_logging();
    require_redis!("test_cost_hint_is_rejected_at_build");

    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&redis_url()).await.unwrap());
    let name = unique_name("redis_cost");
    let err = GroupBuilder::new(name.as_str(), store.clone(), |id: u64| async move { Ok(id) })
        .cost(10)
        .build()
        .await
        .err()
        .unwrap();
    assert!(err.is_configuration());
    assert!(!store.registry().contains(&name));
}

#[tokio::test]
async fn test_store_without_topic_rejects_messaging() {
    setup_logging();
    require_redis!("test_store_without_topic_rejects_messaging");

    let store = RedisStore::connect(&redis_url()).await.unwrap();
    assert!(store.topic().is_none());

    let err = store.send(b"{}".to_vec()).await.unwrap_err();
    assert!(matches!(err, CacheError::Configuration(_)));

    let handler: MessageHandler = Arc::new(|_payload| async {}.boxed());
    let err = store.subscribe(handler).await.err().unwrap();
    assert!(matches!(err, CacheError::Configuration(_)));

    // 以这样的存储作为代理的组在创建时就失败
    let shared = Arc::new(store);
    let err = GroupBuilder::new(unique_name("redis_nobroker"), shared.clone() as Arc<dyn Store>, |id: u64| async move { Ok(id) })
        .broker(shared)
        .build()
        .await
        .err()
        .unwrap();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_pubsub_roundtrip() {
    setup_logging();
    require_redis!("test_pubsub_roundtrip");

    let topic = unique_name("cache:invalidate");
    let publisher = RedisStore::connect_with_messaging(&redis_url(), &topic)
        .await
        .unwrap();
    let subscriber = RedisStore::connect_with_messaging(&redis_url(), &topic)
        .await
        .unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: MessageHandler = Arc::new(move |payload| {
        sink.lock().unwrap().push(payload);
        async {}.boxed()
    });
    let subscription = subscriber.subscribe(handler).await.unwrap();

    publisher.send(b"hello".to_vec()).await.unwrap();
    let seen_ref = &seen;
    assert!(eventually(move || async move { !seen_ref.lock().unwrap().is_empty() }).await);
    assert_eq!(seen.lock().unwrap()[0], b"hello".to_vec());

    subscription.close().await.unwrap();
}

#[tokio::test]
async fn test_distributed_groups_over_redis() {
    setup_logging();
    require_redis!("test_distributed_groups_over_redis");

    let topic = unique_name("cache:invalidate");
    let name = unique_name("users");
    let calls = Arc::new(AtomicUsize::new(0));

    // 两个实例使用各自的连接，共享同一个Redis和主题
    let mut groups = Vec::new();
    let mut stores = Vec::new();
    for _ in 0..2 {
        let mut config = RedisConfig::from_url(&redis_url());
        config.topic = Some(topic.clone());
        let store = Arc::new(RedisStore::new(&config).await.unwrap());
        let loader_calls = calls.clone();
        let group = GroupBuilder::new(name.as_str(), store.clone() as Arc<dyn Store>, move |id: u64| {
            let calls = loader_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("user-{}", id))
            }
        })
        .broker(store.clone())
        .ttl(Duration::from_secs(30))
        .build()
        .await
        .unwrap();
        groups.push(group);
        stores.push(store);
    }

    assert_eq!(groups[0].get(&42).await.unwrap(), "user-42");
    // 共享存储：第二个实例直接命中
    assert_eq!(groups[1].get(&42).await.unwrap(), "user-42");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    groups[1].del(&42).await.unwrap();
    let gk = stores[0].key(&name, "42");
    assert_eq!(stores[0].get(&gk).await.unwrap(), None);

    assert_eq!(groups[0].get(&42).await.unwrap(), "user-42");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    groups[1].clear().await.unwrap();
    let store_ref = &stores[0];
    let gk_ref = &gk;
    assert!(eventually(move || async move { store_ref.get(gk_ref).await.unwrap().is_none() }).await);

    for group in &groups {
        group.shutdown().await.unwrap();
    }
}

/// 订阅并记录收到的所有消息
async fn tap(store: &RedisStore) -> (Subscription, Arc<Mutex<Vec<Vec<u8>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: MessageHandler = Arc::new(move |payload| {
        sink.lock().unwrap().push(payload);
        async {}.boxed()
    });
    (store.subscribe(handler).await.unwrap(), seen)
}

#[tokio::test]
async fn test_own_messages_are_not_delivered_back() {
    setup_logging();
    require_redis!("test_own_messages_are_not_delivered_back");

    let topic = unique_name("cache:invalidate");
    let local = RedisStore::connect_with_messaging(&redis_url(), &topic)
        .await
        .unwrap();
    let peer = RedisStore::connect_with_messaging(&redis_url(), &topic)
        .await
        .unwrap();

    let (local_sub, local_seen) = tap(&local).await;
    let (peer_sub, peer_seen) = tap(&peer).await;

    local.send(b"from-local".to_vec()).await.unwrap();
    peer.send(b"from-peer".to_vec()).await.unwrap();

    let (local_ref, peer_ref) = (&local_seen, &peer_seen);
    assert!(eventually(move || async move { !local_ref.lock().unwrap().is_empty() }).await);
    assert!(eventually(move || async move { !peer_ref.lock().unwrap().is_empty() }).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*local_seen.lock().unwrap(), vec![b"from-peer".to_vec()]);
    assert_eq!(*peer_seen.lock().unwrap(), vec![b"from-local".to_vec()]);

    local_sub.close().await.unwrap();
    peer_sub.close().await.unwrap();
}

#[tokio::test]
async fn test_distributed_del_mutates_local_store_once() {
    setup_logging();
    require_redis!("test_distributed_del_mutates_local_store_once");

    let topic = unique_name("cache:invalidate");
    let name = unique_name("orders");
    let store = Arc::new(
        RedisStore::connect_with_messaging(&redis_url(), &topic)
            .await
            .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let loader_calls = calls.clone();
    let group = GroupBuilder::new(name.as_str(), store.clone() as Arc<dyn Store>, move |id: u64| {
        let calls = loader_calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(id)
        }
    })
    .broker(store.clone())
    .ttl(Duration::from_secs(30))
    .build()
    .await
    .unwrap();

    group.get(&7).await.unwrap();
    group.del(&7).await.unwrap();
    // 删除之后立即重新加载；若自身的通知被投递回来，会把这次写入删掉
    group.get(&7).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let gk = store.key(&name, "7");
    assert!(store.get(&gk).await.unwrap().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    group.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_group_name_with_separator_is_rejected() {
    setup_logging();
    require_redis!("test_group_name_with_separator_is_rejected");

    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&redis_url()).await.unwrap());
    let name = format!("{}:admins", unique_name("redis_users"));
    let err = GroupBuilder::new(name.as_str(), store.clone(), |id: u64| async move { Ok(id) })
        .build()
        .await
        .err()
        .unwrap();
    assert!(err.is_configuration());
    assert!(!store.registry().contains(&name));
}
