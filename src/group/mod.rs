//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存组：按键读取并在未命中时调用加载函数，
//! 同键并发加载合并为一次，删除和清空可通过消息代理通知其他实例。

pub mod builder;

use crate::backend::{GroupKey, Store};
use crate::broker::{Broker, MessageHandler, Subscription};
use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Serializer, SerializerEnum};
use crate::sync::{decode_notice, InvalidationMessage, Notice, SingleFlight};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

pub use builder::GroupBuilder;

/// 加载函数，按键返回值或错误
pub type Loader<K, V> = Arc<dyn Fn(K) -> BoxFuture<'static, Result<V>> + Send + Sync>;

/// 缓存键需要满足的约束
///
/// 键通过 `Display` 生成后端键，通过serde出现在失效消息中
pub trait CacheKey:
    Clone + Eq + Hash + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> CacheKey for T where
    T: Clone + Eq + Hash + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// 缓存值需要满足的约束
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// 组的共享状态，被调用方和订阅任务共同持有
pub(crate) struct GroupCore<K, V> {
    name: String,
    store: Arc<dyn Store>,
    broker: Option<Arc<dyn Broker>>,
    loader: Loader<K, V>,
    flight: Option<SingleFlight<K, V>>,
    serializer: SerializerEnum,
    value_type: &'static str,
}

impl<K: CacheKey, V: CacheValue> GroupCore<K, V> {
    fn group_key(&self, key: &K) -> GroupKey {
        self.store.key(&self.name, &key.to_string())
    }

    /// 读取并解码缓存项
    ///
    /// 无法解码的数据按未命中处理，随后的加载会覆盖它
    async fn lookup(&self, gk: &GroupKey) -> Result<Option<V>> {
        let bytes = match self.store.get(gk).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                GLOBAL_METRICS.record_request(&self.name, "Store", "get", "error");
                return Err(e);
            }
        };
        match self.serializer.deserialize::<V>(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "Group '{}': 缓存项 {} 无法解码为 {}，按未命中处理: {}",
                    self.name, gk.store_key, self.value_type, e
                );
                GLOBAL_METRICS.record_request(&self.name, "Store", "get", "corrupt");
                Ok(None)
            }
        }
    }

    /// 调用加载函数并写回存储
    ///
    /// 写入失败只记录日志，加载成功的值照常返回
    async fn load_and_store(self: Arc<Self>, key: K, gk: GroupKey) -> Result<V> {
        let start = Instant::now();
        let value = match (self.loader)(key).await {
            Ok(value) => {
                GLOBAL_METRICS.record_request(&self.name, "Loader", "load", "ok");
                value
            }
            Err(e) => {
                GLOBAL_METRICS.record_request(&self.name, "Loader", "load", "error");
                debug!("Group '{}': 加载 {} 失败: {}", self.name, gk.store_key, e);
                return Err(e);
            }
        };
        GLOBAL_METRICS.record_duration(
            &self.name,
            "Loader",
            "load",
            start.elapsed().as_secs_f64(),
        );

        let written = match self.serializer.serialize(&value) {
            Ok(bytes) => self.store.set(&gk, bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(
                "Group '{}': 加载成功但写入 {} 失败: {}",
                self.name, gk.store_key, e
            );
            GLOBAL_METRICS.record_request(&self.name, "Store", "set", "error");
        }
        Ok(value)
    }

    /// 广播失效消息，未配置消息代理时什么也不做
    async fn publish(&self, message: InvalidationMessage<K>) -> Result<()> {
        let Some(broker) = &self.broker else {
            return Ok(());
        };
        let payload = message.to_bytes()?;
        match broker.send(payload).await {
            Ok(()) => {
                GLOBAL_METRICS.record_request(&self.name, "Broker", "publish", "ok");
                Ok(())
            }
            Err(e) => {
                warn!("Group '{}': 本地已失效，广播失败: {}", self.name, e);
                GLOBAL_METRICS.record_request(&self.name, "Broker", "publish", "error");
                Err(match e {
                    CacheError::Broker(_) | CacheError::Configuration(_) => e,
                    other => CacheError::Broker(other.to_string()),
                })
            }
        }
    }

    /// 处理收到的失效消息
    ///
    /// 只修改本地存储，从不再次广播
    async fn on_notice(&self, payload: &[u8]) {
        let notice = match decode_notice::<K>(payload, &self.name) {
            Ok(Some(notice)) => notice,
            Ok(None) => return,
            Err(e) => {
                warn!("Group '{}': 丢弃无法解析的失效消息: {}", self.name, e);
                GLOBAL_METRICS.record_request(&self.name, "Broker", "receive", "invalid");
                return;
            }
        };

        let result = match &notice {
            Notice::Delete(key) => {
                let gk = self.group_key(key);
                debug!("Group '{}': 远端删除 {}", self.name, gk.store_key);
                self.store.invalidate(&gk).await
            }
            Notice::Clear => {
                debug!("Group '{}': 远端清空", self.name);
                self.store.invalidate_group(&self.name).await
            }
        };
        match result {
            Ok(()) => GLOBAL_METRICS.record_request(&self.name, "Store", "invalidate", "remote"),
            Err(e) => {
                warn!("Group '{}': 应用远端失效失败: {}", self.name, e);
                GLOBAL_METRICS.record_request(&self.name, "Store", "invalidate", "error");
            }
        }
    }

    /// 订阅处理函数，持有共享状态直到订阅关闭
    fn handler(self: &Arc<Self>) -> MessageHandler {
        let core = self.clone();
        Arc::new(move |payload: Vec<u8>| {
            let core = core.clone();
            async move { core.on_notice(&payload).await }.boxed()
        })
    }
}

/// 缓存组
///
/// 通过 [`GroupBuilder`] 创建。组名在同一个存储上唯一，
/// 组被丢弃时组名释放，订阅随之停止。
pub struct Group<K, V> {
    core: Arc<GroupCore<K, V>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<K: CacheKey, V: CacheValue> Group<K, V> {
    /// 读取缓存值
    ///
    /// 命中时直接返回；未命中时调用加载函数并写回存储。
    /// 启用单飞时同一个键的并发调用只触发一次加载，所有调用者得到相同的结果。
    ///
    /// # 参数
    ///
    /// * `key` - 逻辑键
    ///
    /// # 返回值
    ///
    /// 缓存值或加载函数返回的错误
    #[instrument(skip(self, key), level = "debug", fields(group = %self.core.name, key = %key))]
    pub async fn get(&self, key: &K) -> Result<V> {
        let core = &self.core;
        let start = Instant::now();
        let gk = core.group_key(key);

        if let Some(value) = core.lookup(&gk).await? {
            GLOBAL_METRICS.record_request(&core.name, "Store", "get", "hit");
            GLOBAL_METRICS.record_duration(
                &core.name,
                "Store",
                "get",
                start.elapsed().as_secs_f64(),
            );
            return Ok(value);
        }
        GLOBAL_METRICS.record_request(&core.name, "Store", "get", "miss");

        let load = core.clone().load_and_store(key.clone(), gk);
        match &core.flight {
            Some(flight) => flight.work(key.clone(), load).await,
            None => load.await,
        }
    }

    /// 删除缓存项并通知其他实例
    ///
    /// 本地删除先于广播完成；广播失败返回 [`CacheError::Broker`]，本地删除不回滚。
    #[instrument(skip(self, key), level = "debug", fields(group = %self.core.name, key = %key))]
    pub async fn del(&self, key: &K) -> Result<()> {
        let core = &self.core;
        let gk = core.group_key(key);
        core.store.del(&gk).await?;
        GLOBAL_METRICS.record_request(&core.name, "Store", "invalidate", "local");
        core.publish(InvalidationMessage::delete(core.name.clone(), key.clone()))
            .await
    }

    /// 清空组内所有缓存项并通知其他实例
    #[instrument(skip(self), level = "debug", fields(group = %self.core.name))]
    pub async fn clear(&self) -> Result<()> {
        let core = &self.core;
        core.store.clear(&core.name).await?;
        GLOBAL_METRICS.record_request(&core.name, "Store", "invalidate", "local");
        core.publish(InvalidationMessage::clear(core.name.clone()))
            .await
    }
}

impl<K, V> Group<K, V> {
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// 是否绑定了消息代理
    pub fn is_distributed(&self) -> bool {
        self.core.broker.is_some()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.core.store
    }

    /// 停止接收失效消息并等待投递任务结束，重复调用无副作用
    pub async fn shutdown(&self) -> Result<()> {
        let subscription = self.subscription.lock().await.take();
        if let Some(subscription) = subscription {
            subscription.close().await?;
            debug!("Group '{}': 订阅已关闭", self.core.name);
        }
        Ok(())
    }
}

impl<K, V> Drop for Group<K, V> {
    fn drop(&mut self) {
        self.core.store.registry().release(&self.core.name);
    }
}
