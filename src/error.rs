//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use std::sync::Arc;
use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 错误需要实现 `Clone`：同一次合并加载的结果（包括错误）会原样交给所有等待者。
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// 加载函数返回的错误，原样传递给调用方
    #[error("Loader error: {0}")]
    Loader(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 存储后端操作失败
    #[error("Store operation failed: {0}")]
    Store(String),

    /// 消息代理操作失败（本地修改已经生效）
    #[error("Broker operation failed: {0}")]
    Broker(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(Arc<redis::RedisError>),

    /// IO错误
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl CacheError {
    /// 将任意错误包装为加载错误
    pub fn loader(err: impl std::fmt::Display) -> Self {
        CacheError::Loader(err.to_string())
    }

    /// 是否为配置类错误
    pub fn is_configuration(&self) -> bool {
        matches!(self, CacheError::Configuration(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(Arc::new(err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
