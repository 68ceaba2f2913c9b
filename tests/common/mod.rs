//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use anycache::backend::{GroupConfig, GroupKey, GroupRegistry, MemoryStore, Store};
use anycache::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 测试使用的Redis地址，优先读取环境变量 REDIS_URL
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 检查Redis是否可用
pub async fn is_redis_available() -> bool {
    let client = match redis::Client::open(redis_url()) {
        Ok(client) => client,
        Err(_) => return false,
    };
    let connect = client.get_multiplexed_async_connection();
    match tokio::time::timeout(Duration::from_secs(2), connect).await {
        Ok(Ok(mut conn)) => {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong.is_ok()
        }
        _ => false,
    }
}

/// 生成唯一名称，避免并行测试之间互相干扰
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// 轮询直到条件成立或超时
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// 统计删除次数的内存存储
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    registry: GroupRegistry,
    pub sets: AtomicUsize,
    pub deletes: AtomicUsize,
    pub clears: AtomicUsize,
}

impl CountingStore {
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for CountingStore {
    fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    async fn configure_group(&self, group_name: &str, config: GroupConfig) -> Result<()> {
        self.inner.configure_group(group_name, config).await
    }

    async fn get(&self, key: &GroupKey) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &GroupKey, value: Vec<u8>) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn del(&self, key: &GroupKey) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.del(key).await
    }

    async fn clear(&self, group_name: &str) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(group_name).await
    }
}
