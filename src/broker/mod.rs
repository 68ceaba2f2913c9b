//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了用于传递失效通知的消息代理契约和订阅句柄。

pub mod memory;

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use memory::{MemoryBroker, MemoryBus};

/// 消息处理函数，每条收到的消息调用一次
pub type MessageHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// 消息代理特征
///
/// 只提供尽力而为的广播，不保证送达和跨发布者的顺序
#[async_trait]
pub trait Broker: Send + Sync {
    /// 向同一主题上的其他订阅者广播消息
    async fn send(&self, payload: Vec<u8>) -> Result<()>;

    /// 注册消息处理函数，返回用于停止投递的订阅句柄
    async fn subscribe(&self, handler: MessageHandler) -> Result<Subscription>;
}

/// 订阅句柄
///
/// 关闭或丢弃句柄都会停止消息投递并释放传输层订阅
pub struct Subscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// 订阅是否已经关闭
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .handle
                .as_ref()
                .map(|h| h.is_finished())
                .unwrap_or(true)
    }

    /// 关闭订阅并等待投递任务结束
    pub async fn close(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| CacheError::Broker(format!("delivery task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 在后台任务中按接收顺序把消息交给处理函数
pub(crate) fn spawn_delivery(
    mut messages: BoxStream<'static, Vec<u8>>,
    handler: MessageHandler,
) -> Subscription {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Subscription: 收到关闭信号");
                    break;
                }
                next = messages.next() => match next {
                    Some(payload) => handler(payload).await,
                    None => {
                        debug!("Subscription: 消息流已结束");
                        break;
                    }
                },
            }
        }
    });
    Subscription::new(cancel, handle)
}
