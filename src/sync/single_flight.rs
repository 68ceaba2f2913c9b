//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了单飞（Single-Flight）加载合并：同一个键同时只执行一次加载，
//! 其余调用者等待并共享同一个结果。

use crate::error::{CacheError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

/// 加载合并单元
///
/// 键在加载完成时立即移除，不缓存结果；不同键之间互不阻塞。
pub struct SingleFlight<K, V> {
    in_flight: Arc<DashMap<K, Flight<V>>>,
}

/// 加载任务结束（包括panic）时移除键
struct Retire<K, V>
where
    K: Eq + Hash,
{
    in_flight: Arc<DashMap<K, Flight<V>>>,
    key: K,
}

impl<K, V> Drop for Retire<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// 执行或加入 `key` 对应的加载
    ///
    /// 已有加载在进行时 `fut` 不会被执行，调用者得到进行中加载的结果（值或错误）。
    /// 加载在独立任务中运行：所有调用者都被取消时它仍会执行完毕并移除键。
    pub async fn work<F>(&self, key: K, fut: F) -> Result<V>
    where
        F: Future<Output = Result<V>> + Send + 'static,
    {
        let flight = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!("SingleFlight: 加入进行中的加载");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let retire = Retire {
                    in_flight: self.in_flight.clone(),
                    key,
                };
                let task = tokio::spawn(async move {
                    let _retire = retire;
                    fut.await
                });
                let flight = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(CacheError::Loader(format!("load task failed: {}", e))),
                    }
                }
                .boxed()
                .shared();
                entry.insert(flight.clone());
                flight
            }
        };
        flight.await
    }

    /// 当前正在加载的键数量
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
