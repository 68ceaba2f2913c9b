//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存的存储后端，使用Moka作为底层缓存库。

use super::{GroupConfig, GroupKey, GroupRegistry, Store};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// 内存缓存项
#[derive(Clone)]
struct MemoryEntry {
    /// 所属组名
    group: String,
    bytes: Vec<u8>,
    /// 过期时间
    expire_at: Option<Instant>,
    /// 在容量统计中的权重
    weight: u32,
}

/// 内存存储后端
///
/// 支持按组设置 TTL 和开销提示。开销提示作为缓存项权重计入 `max_capacity`，
/// 未设置时每项权重为 1。克隆得到的实例共享同一份数据。
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, MemoryEntry>,
    configs: Arc<DashMap<String, GroupConfig>>,
    registry: Arc<GroupRegistry>,
}

impl MemoryStore {
    /// 创建新的内存存储
    ///
    /// # 参数
    ///
    /// * `max_capacity` - 所有缓存项权重之和的上限
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .weigher(|_key: &String, entry: &MemoryEntry| entry.weight)
            .build();
        Self {
            cache,
            configs: Arc::new(DashMap::new()),
            registry: Arc::new(GroupRegistry::new()),
        }
    }

    /// 当前缓存项数量（近似值）
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// 执行Moka的挂起维护任务，使计数等统计立即生效
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    fn group_config(&self, group_name: &str) -> GroupConfig {
        self.configs
            .get(group_name)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    #[instrument(skip(self), level = "debug")]
    async fn configure_group(&self, group_name: &str, config: GroupConfig) -> Result<()> {
        debug!("Memory configure_group: group={}, config={:?}", group_name, config);
        self.configs.insert(group_name.to_string(), config);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &GroupKey) -> Result<Option<Vec<u8>>> {
        match self.cache.get(&key.store_key).await {
            Some(entry) => {
                if let Some(expire_time) = entry.expire_at {
                    if Instant::now() >= expire_time {
                        self.cache.remove(&key.store_key).await;
                        debug!("Memory get: key={}, expired=true, removed", key.store_key);
                        return Ok(None);
                    }
                }
                debug!("Memory get: key={}, found=true", key.store_key);
                Ok(Some(entry.bytes))
            }
            None => {
                debug!("Memory get: key={}, found=false", key.store_key);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &GroupKey, value: Vec<u8>) -> Result<()> {
        let config = self.group_config(&key.group_name);
        let expire_at = config.ttl.map(|ttl| Instant::now() + ttl);
        let weight = config
            .cost
            .map(|c| c.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(1);
        debug!(
            "Memory set: key={}, value_len={}, ttl={:?}, weight={}",
            key.store_key,
            value.len(),
            config.ttl,
            weight
        );
        self.cache
            .insert(
                key.store_key.clone(),
                MemoryEntry {
                    group: key.group_name.clone(),
                    bytes: value,
                    expire_at,
                    weight,
                },
            )
            .await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn del(&self, key: &GroupKey) -> Result<()> {
        self.cache.invalidate(&key.store_key).await;
        debug!("Memory del: key={} 删除完成", key.store_key);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self, group_name: &str) -> Result<()> {
        // 按记录的组名匹配
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.group == group_name)
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        debug!("Memory clear: group={}, entries={}", group_name, keys.len());
        for key in keys {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }
}
