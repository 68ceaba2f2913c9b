//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨实例缓存失效的消息格式。
//!
//! 消息是一个JSON对象 `{"group": "<组名>", "key": <键或null>}`，
//! `key` 为 `null` 表示清空整个组。

use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 缓存失效消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationMessage<K> {
    pub group: String,
    pub key: Option<K>,
}

impl<K> InvalidationMessage<K> {
    /// 删除单个键的消息
    pub fn delete(group: impl Into<String>, key: K) -> Self {
        Self {
            group: group.into(),
            key: Some(key),
        }
    }

    /// 清空整个组的消息
    pub fn clear(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: None,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.key.is_none()
    }
}

impl<K: Serialize> InvalidationMessage<K> {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

impl<K: DeserializeOwned> InvalidationMessage<K> {
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

/// 解码后发给某个组的失效通知
#[derive(Debug, Clone, PartialEq)]
pub enum Notice<K> {
    Delete(K),
    Clear,
}

/// 只解析组名，键保持原始JSON
#[derive(Deserialize)]
struct Envelope {
    group: String,
    #[serde(default)]
    key: serde_json::Value,
}

/// 解码发给 `group` 的通知
///
/// 先比较组名再解析键：同一主题上可能有键类型不同的其他组。
/// 发给其他组的消息返回 `Ok(None)`。
pub fn decode_notice<K: DeserializeOwned>(payload: &[u8], group: &str) -> Result<Option<Notice<K>>> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| CacheError::Serialization(e.to_string()))?;
    if envelope.group != group {
        return Ok(None);
    }
    if envelope.key.is_null() {
        return Ok(Some(Notice::Clear));
    }
    let key = serde_json::from_value(envelope.key).map_err(|e| {
        CacheError::Serialization(format!("invalid key for group '{}': {}", group, e))
    })?;
    Ok(Some(Notice::Delete(key)))
}
