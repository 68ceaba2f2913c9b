//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了双层存储，结合本地L1和共享L2。

use super::{GroupConfig, GroupKey, GroupRegistry, Store};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 双层存储
///
/// 读取时先查L1，L1未命中再查L2，L2命中的值会回填到L1。
/// 本地删除和清空同时作用于两层；远端失效通知只清理L1，
/// 因为L2的修改已经由发出通知的实例完成。
pub struct TwoLevelStore {
    l1: Arc<dyn Store>,
    l2: Arc<dyn Store>,
    registry: GroupRegistry,
}

impl TwoLevelStore {
    /// 创建新的双层存储
    ///
    /// # 参数
    ///
    /// * `l1` - 本地存储（通常是 [`MemoryStore`](super::MemoryStore)）
    /// * `l2` - 实例间共享的存储（通常是 [`RedisStore`](super::RedisStore)）
    pub fn new(l1: Arc<dyn Store>, l2: Arc<dyn Store>) -> Self {
        Self {
            l1,
            l2,
            registry: GroupRegistry::new(),
        }
    }

    pub fn l1(&self) -> &Arc<dyn Store> {
        &self.l1
    }

    pub fn l2(&self) -> &Arc<dyn Store> {
        &self.l2
    }
}

#[async_trait]
impl Store for TwoLevelStore {
    fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    /// 开销提示只交给L1，L2没有容量淘汰的概念
    #[instrument(skip(self), level = "debug")]
    async fn configure_group(&self, group_name: &str, config: GroupConfig) -> Result<()> {
        self.l1.configure_group(group_name, config.clone()).await?;
        let l2_config = GroupConfig {
            cost: None,
            ..config
        };
        self.l2.configure_group(group_name, l2_config).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &GroupKey) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.l1.get(key).await? {
            debug!("TwoLevel get: L1 hit, key={}", key.store_key);
            return Ok(Some(bytes));
        }

        match self.l2.get(key).await? {
            Some(bytes) => {
                debug!("TwoLevel get: L2 hit, key={}", key.store_key);
                if let Err(e) = self.l1.set(key, bytes.clone()).await {
                    warn!("TwoLevel get: 回填L1失败, key={}: {}", key.store_key, e);
                }
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &GroupKey, value: Vec<u8>) -> Result<()> {
        self.l1.set(key, value.clone()).await?;
        self.l2.set(key, value).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn del(&self, key: &GroupKey) -> Result<()> {
        self.l1.del(key).await?;
        self.l2.del(key).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self, group_name: &str) -> Result<()> {
        self.l1.clear(group_name).await?;
        self.l2.clear(group_name).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate(&self, key: &GroupKey) -> Result<()> {
        self.l1.invalidate(key).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate_group(&self, group_name: &str) -> Result<()> {
        self.l1.invalidate_group(group_name).await
    }
}
