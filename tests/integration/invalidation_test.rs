//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 跨实例缓存失效集成测试

#[path = "../common/mod.rs"]
mod common;

use anycache::backend::{MemoryStore, Store};
use anycache::broker::{Broker, MessageHandler, MemoryBus};
use anycache::error::Result;
use anycache::{Group, GroupBuilder, InvalidationMessage};
use common::{eventually, setup_logging, CountingStore};
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

async fn users_group(
    store: Arc<dyn Store>,
    bus: &MemoryBus,
    calls: Arc<AtomicUsize>,
) -> Result<Group<u64, String>> {
    GroupBuilder::new("users", store, move |id: u64| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("user-{}", id))
        }
    })
    .broker(Arc::new(bus.broker()))
    .build()
    .await
}

/// 在总线上旁听所有消息
async fn tap(bus: &MemoryBus) -> (anycache::Subscription, Arc<Mutex<Vec<Vec<u8>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: MessageHandler = Arc::new(move |payload| {
        sink.lock().unwrap().push(payload);
        async {}.boxed()
    });
    let subscription = bus.broker().subscribe(handler).await.unwrap();
    (subscription, seen)
}

/// A 删除后 A、B 各删除一次，总共只发出一条消息
#[tokio::test]
async fn test_del_invalidates_peer_without_amplification() {
    setup_logging();

    let bus = MemoryBus::default();
    let store_a = Arc::new(CountingStore::default());
    let store_b = Arc::new(CountingStore::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let a = users_group(store_a.clone(), &bus, calls.clone()).await.unwrap();
    let b = users_group(store_b.clone(), &bus, calls.clone()).await.unwrap();
    let (_tap, seen) = tap(&bus).await;

    a.get(&42).await.unwrap();
    b.get(&42).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    a.del(&42).await.unwrap();

    let gk = store_b.key("users", "42");
    let (peer, gk_ref) = (&store_b, &gk);
    assert!(eventually(move || async move { peer.get(gk_ref).await.unwrap().is_none() }).await);
    // 等待可能出现的多余消息
    sleep(Duration::from_millis(100)).await;

    assert_eq!(store_a.deletes(), 1);
    assert_eq!(store_b.deletes(), 1);
    assert_eq!(bus.published(), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![br#"{"group":"users","key":42}"#.to_vec()]
    );

    // B 重新加载最新值
    b.get(&42).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clear_broadcasts_null_key() {
    setup_logging();

    let bus = MemoryBus::default();
    let store_a: Arc<dyn Store> = Arc::new(MemoryStore::new(1000));
    let store_b: Arc<dyn Store> = Arc::new(MemoryStore::new(1000));
    let calls = Arc::new(AtomicUsize::new(0));
    let a = users_group(store_a, &bus, calls.clone()).await.unwrap();
    let b = users_group(store_b.clone(), &bus, calls.clone()).await.unwrap();
    let (_tap, seen) = tap(&bus).await;

    for id in 1..=3 {
        b.get(&id).await.unwrap();
    }

    a.clear().await.unwrap();

    let peer = &store_b;
    assert!(
        eventually(move || async move {
            let mut empty = true;
            for id in 1..=3 {
                let gk = peer.key("users", &id.to_string());
                empty &= peer.get(&gk).await.unwrap().is_none();
            }
            empty
        })
        .await
    );
    assert_eq!(
        *seen.lock().unwrap(),
        vec![br#"{"group":"users","key":null}"#.to_vec()]
    );
    assert_eq!(bus.published(), 1);
}

#[tokio::test]
async fn test_notice_for_other_group_is_ignored() {
    setup_logging();

    let bus = MemoryBus::default();
    let store = Arc::new(CountingStore::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let group = users_group(store.clone(), &bus, calls).await.unwrap();
    group.get(&42).await.unwrap();

    let outsider = bus.broker();
    let other_group = InvalidationMessage::delete("orders", 42u64);
    outsider.send(other_group.to_bytes().unwrap()).await.unwrap();
    // 键类型不同的组共用主题
    let string_keys = InvalidationMessage::delete("names", "bob".to_string());
    outsider.send(string_keys.to_bytes().unwrap()).await.unwrap();
    outsider.send(b"not json".to_vec()).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(store.deletes(), 0);
    assert_eq!(store.clears(), 0);
    assert!(store.get(&store.key("users", "42")).await.unwrap().is_some());

    // 失效处理任务仍在运行
    outsider
        .send(InvalidationMessage::delete("users", 42u64).to_bytes().unwrap())
        .await
        .unwrap();
    let local = &store;
    assert!(
        eventually(move || async move {
            local.get(&local.key("users", "42")).await.unwrap().is_none()
        })
        .await
    );
    assert_eq!(store.deletes(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_delivery() {
    setup_logging();

    let bus = MemoryBus::default();
    let store = Arc::new(CountingStore::default());
    let group = users_group(store.clone(), &bus, Arc::new(AtomicUsize::new(0)))
        .await
        .unwrap();
    group.get(&1).await.unwrap();

    group.shutdown().await.unwrap();
    group.shutdown().await.unwrap();

    bus.broker()
        .send(InvalidationMessage::delete("users", 1u64).to_bytes().unwrap())
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(store.deletes(), 0);

    // 本地删除和广播不受影响
    group.del(&1).await.unwrap();
    assert_eq!(store.deletes(), 1);
    assert_eq!(bus.published(), 2);
}

#[tokio::test]
async fn test_groups_without_broker_do_not_publish() {
    setup_logging();

    let bus = MemoryBus::default();
    let (_tap, seen) = tap(&bus).await;
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(100));
    let group = GroupBuilder::new("local", store, |id: u64| async move { Ok(id) })
        .build()
        .await
        .unwrap();

    group.get(&1).await.unwrap();
    group.del(&1).await.unwrap();
    group.clear().await.unwrap();
    sleep(Duration::from_millis(50)).await;

    assert!(!group.is_distributed());
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(bus.published(), 0);
}
