//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内消息代理，用于测试和单进程内多个缓存实例之间的失效通知。

use super::{spawn_delivery, Broker, MessageHandler, Subscription};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

/// 进程内的共享主题
///
/// 每个 [`MemoryBroker`] 端点代表一个缓存实例，消息不会投递回发送它的端点
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<(u64, Arc<Vec<u8>>)>,
    next_id: Arc<AtomicU64>,
    published: Arc<AtomicU64>,
}

impl MemoryBus {
    /// 创建新的主题
    ///
    /// # 参数
    ///
    /// * `capacity` - 每个订阅者可积压的消息数
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 创建新的端点
    pub fn broker(&self) -> MemoryBroker {
        MemoryBroker {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            bus: self.clone(),
        }
    }

    /// 主题上累计发布的消息数
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// [`MemoryBus`] 上的一个端点
#[derive(Clone)]
pub struct MemoryBroker {
    id: u64,
    bus: MemoryBus,
}

impl MemoryBroker {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    #[instrument(skip(self, payload), level = "debug", fields(endpoint = self.id))]
    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        self.bus.published.fetch_add(1, Ordering::SeqCst);
        // 没有订阅者时 broadcast 返回错误，对尽力而为的广播来说不算失败
        if self.bus.sender.send((self.id, Arc::new(payload))).is_err() {
            debug!("MemoryBroker: 当前没有订阅者");
        }
        Ok(())
    }

    #[instrument(skip(self, handler), level = "debug", fields(endpoint = self.id))]
    async fn subscribe(&self, handler: MessageHandler) -> Result<Subscription> {
        let receiver = self.bus.sender.subscribe();
        let own_id = self.id;
        let messages = stream::unfold(receiver, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok((origin, _)) if origin == own_id => continue,
                    Ok((_, payload)) => return Some((payload.as_ref().clone(), rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("MemoryBroker: 订阅者落后，丢弃了 {} 条消息", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(spawn_delivery(messages.boxed(), handler))
    }
}
