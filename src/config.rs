//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::backend::{validate_group_name, GroupConfig};
use crate::error::{CacheError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 单个TTL的上限：30天
const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Redis配置，未配置时只能使用内存存储
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// 按组名索引的组配置
    #[serde(default)]
    pub groups: HashMap<String, GroupSettings>,
}

/// 全局配置
///
/// 定义适用于所有组的默认配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存过期时间（秒），0 表示不过期
    pub default_ttl: u64,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 默认是否启用单飞加载合并
    pub single_flight: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            serialization: SerializationType::Json,
            single_flight: true,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
    /// gzip压缩的JSON
    JsonGzip,
}

/// 组绑定的存储类型
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// 进程内存储
    #[default]
    Memory,
    /// Redis存储
    Redis,
    /// 内存L1 + Redis L2
    TwoLevel,
}

/// 内存存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MemoryConfig {
    /// 最大容量（缓存项权重之和）
    pub max_capacity: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10000,
        }
    }
}

/// Redis配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 失效通知主题，None 表示不启用消息功能
    pub topic: Option<String>,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            topic: None,
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
        }
    }
}

impl RedisConfig {
    pub fn from_url(url: &str) -> Self {
        Self {
            connection_string: SecretString::new(url.to_string().into()),
            ..Default::default()
        }
    }

    /// 启用TLS时把 `redis://` 改写为 `rediss://`
    pub fn resolved_connection_string(&self) -> String {
        let raw = self.connection_string.expose_secret();
        if self.enable_tls && !raw.starts_with("rediss://") {
            raw.replace("redis://", "rediss://")
        } else {
            raw.to_string()
        }
    }
}

/// 单个组的配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct GroupSettings {
    /// 存储类型
    pub store: StoreType,
    /// 缓存过期时间（秒），可覆盖全局配置
    pub ttl: Option<u64>,
    /// 开销提示，仅内存存储支持
    pub cost: Option<u64>,
    /// 是否启用单飞，可覆盖全局配置
    pub single_flight: Option<bool>,
    /// 是否订阅并广播失效通知
    pub distributed: bool,
}

impl GroupSettings {
    /// 转换为存储后端使用的组配置
    pub fn group_config(&self, global: &GlobalConfig) -> GroupConfig {
        let ttl_secs = self.ttl.unwrap_or(global.default_ttl);
        GroupConfig {
            ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            cost: self.cost,
            ..Default::default()
        }
    }

    pub fn single_flight(&self, global: &GlobalConfig) -> bool {
        self.single_flight.unwrap_or(global.single_flight)
    }
}

impl Config {
    /// 从TOML字符串解析配置并验证
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| CacheError::Configuration(e.to_string()))?;
        config.validate().map_err(CacheError::Configuration)?;
        Ok(config)
    }

    /// 从TOML文件加载配置并验证
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// 获取组配置，未配置的组使用默认值
    pub fn group(&self, name: &str) -> GroupSettings {
        self.groups.get(name).cloned().unwrap_or_default()
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.default_ttl > MAX_TTL_SECS {
            return Err("Global default_ttl cannot exceed 30 days (2592000 seconds)".to_string());
        }

        if self.memory.max_capacity == 0 {
            return Err("Memory max_capacity cannot be zero".to_string());
        }

        if let Some(redis) = &self.redis {
            if !(100..=30000).contains(&redis.connection_timeout_ms) {
                return Err("Redis connection_timeout_ms must be between 100 and 30000 ms".to_string());
            }
            if !(100..=60000).contains(&redis.command_timeout_ms) {
                return Err("Redis command_timeout_ms must be between 100 and 60000 ms".to_string());
            }
            if let Some(topic) = &redis.topic {
                if topic.is_empty() {
                    return Err("Redis topic cannot be empty".to_string());
                }
            }
        }

        for (name, group) in &self.groups {
            validate_group_name(name).map_err(|e| match e {
                CacheError::Configuration(msg) => msg,
                other => other.to_string(),
            })?;

            if name.len() > 64 {
                return Err(format!(
                    "Group name '{}' exceeds maximum length of 64 characters",
                    name
                ));
            }

            let ttl = group.ttl.unwrap_or(self.global.default_ttl);
            if ttl > MAX_TTL_SECS {
                return Err(format!("Group '{}' TTL cannot exceed 30 days", name));
            }

            if group.cost == Some(0) {
                return Err(format!("Group '{}' cost cannot be zero", name));
            }

            match group.store {
                StoreType::Memory => {
                    if group.distributed {
                        return Err(format!(
                            "Group '{}' is distributed but uses the memory store; distributed groups need a redis topic",
                            name
                        ));
                    }
                }
                StoreType::Redis | StoreType::TwoLevel => {
                    let redis = self.redis.as_ref().ok_or_else(|| {
                        format!("Group '{}' uses redis but [redis] is not configured", name)
                    })?;
                    if group.store == StoreType::Redis && group.cost.is_some() {
                        return Err(format!(
                            "Group '{}' configuration error: Redis does not support cost hints",
                            name
                        ));
                    }
                    if group.distributed && redis.topic.is_none() {
                        return Err(format!(
                            "Group '{}' is distributed but redis.topic is not set",
                            name
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}
