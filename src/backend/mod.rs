//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储后端契约以及内置的内存、Redis 和双层存储实现。

pub mod memory;
pub mod redis_store;
pub mod two_level;

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use std::time::Duration;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use two_level::TwoLevelStore;

/// 组内缓存项的唯一标识
///
/// 由存储后端根据组名和逻辑键生成，仅在单次调用中使用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    /// 组名
    pub group_name: String,
    /// 后端使用的实际键
    pub store_key: String,
}

/// 按组划分的后端配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// 缓存项存活时间，None 表示由后端决定
    pub ttl: Option<Duration>,
    /// 单个缓存项的开销提示
    pub cost: Option<u64>,
    /// 组内值的类型名，用于诊断无法解码的数据
    pub value_type: &'static str,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            cost: None,
            value_type: "bytes",
        }
    }
}

impl GroupConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// 生成 `"<组名>:<逻辑键>"` 形式的后端键
pub fn namespaced_key(group_name: &str, key: &str) -> GroupKey {
    GroupKey {
        group_name: group_name.to_string(),
        store_key: format!("{}{}{}", group_name, KEY_SEPARATOR, key),
    }
}

/// 组名与逻辑键之间的分隔符，组名中不允许出现
pub const KEY_SEPARATOR: char = ':';

/// 检查组名能否用于 `"<组名>:<逻辑键>"` 编码
///
/// 含分隔符的组名会与其他组的键重叠（组 `a` 的键 `b:1` 与组 `a:b` 的键 `1`）
pub fn validate_group_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::Configuration(
            "Group name cannot be empty".to_string(),
        ));
    }
    if name.contains(KEY_SEPARATOR) {
        return Err(CacheError::Configuration(format!(
            "Group name '{}' cannot contain '{}'",
            name, KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// 已注册组名集合
///
/// 同一个存储上不允许出现两个同名的组
#[derive(Debug, Default)]
pub struct GroupRegistry {
    names: DashSet<String>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册组名，非法或重复的组名返回配置错误
    pub fn register(&self, name: &str) -> Result<()> {
        validate_group_name(name)?;
        if !self.names.insert(name.to_string()) {
            return Err(CacheError::Configuration(format!(
                "Group '{}' is already registered on this store",
                name
            )));
        }
        Ok(())
    }

    /// 释放组名，用于组创建失败时回滚注册
    pub fn release(&self, name: &str) {
        self.names.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 存储后端特征
///
/// 每个组绑定一个存储后端，后端负责实际数据、键编码以及按组的配置。
/// 值以组序列化器生成的字节形式传递。
#[async_trait]
pub trait Store: Send + Sync {
    /// 根据组名和逻辑键生成后端键，结果必须是确定的
    fn key(&self, group_name: &str, key: &str) -> GroupKey {
        namespaced_key(group_name, key)
    }

    /// 后端持有的组名注册表
    fn registry(&self) -> &GroupRegistry;

    /// 注册组名
    fn register_group(&self, group_name: &str) -> Result<()> {
        self.registry().register(group_name)
    }

    /// 配置组，重复调用是幂等的；后端无法支持的选项必须在此处报错
    async fn configure_group(&self, group_name: &str, config: GroupConfig) -> Result<()>;

    /// 读取缓存项，`Ok(None)` 表示未命中
    async fn get(&self, key: &GroupKey) -> Result<Option<Vec<u8>>>;

    /// 写入缓存项
    async fn set(&self, key: &GroupKey, value: Vec<u8>) -> Result<()>;

    /// 删除缓存项
    async fn del(&self, key: &GroupKey) -> Result<()>;

    /// 删除组内所有缓存项
    async fn clear(&self, group_name: &str) -> Result<()>;

    /// 收到远端失效通知时删除缓存项
    async fn invalidate(&self, key: &GroupKey) -> Result<()> {
        self.del(key).await
    }

    /// 收到远端清空通知时删除组内缓存项
    async fn invalidate_group(&self, group_name: &str) -> Result<()> {
        self.clear(group_name).await
    }
}
