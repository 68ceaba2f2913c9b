//! anycache - 通用读穿透缓存组
//!
//! 按组名组织缓存：未命中时调用加载函数并写回存储，同键并发加载合并为一次，
//! 删除和清空可以通过消息代理通知集群中的其他实例。
//!
//! ```no_run
//! use anycache::{GroupBuilder, MemoryStore, Store};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anycache::error::Result<()> {
//! let store: Arc<dyn Store> = Arc::new(MemoryStore::new(10_000));
//! let users = GroupBuilder::new("users", store, |id: u64| async move {
//!     Ok(format!("user-{}", id))
//! })
//! .build()
//! .await?;
//!
//! assert_eq!(users.get(&42).await?, "user-42");
//! users.del(&42).await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/anycache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod group;
pub mod metrics;
pub mod serialization;
pub mod sync;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{GroupConfig, GroupKey, MemoryStore, RedisStore, Store, TwoLevelStore};
pub use broker::{Broker, MemoryBroker, MemoryBus, Subscription};
pub use config::Config;
pub use error::{CacheError, Result};
pub use group::{Group, GroupBuilder};
pub use sync::{InvalidationMessage, SingleFlight};

/// anycache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
