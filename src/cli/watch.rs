//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了监听失效通知命令的实现。

use crate::backend::RedisStore;
use crate::broker::{Broker, MessageHandler};
use crate::cli::WatchArgs;
use crate::sync::InvalidationMessage;
use anyhow::{Context, Result};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;

/// 把一条通知格式化为一行输出，不属于 `group` 的通知返回 None
pub(crate) fn describe(payload: &[u8], group: Option<&str>) -> Option<String> {
    let message = match InvalidationMessage::<Value>::from_bytes(payload) {
        Ok(message) => message,
        Err(_) => {
            return Some(format!(
                "<malformed> {}",
                String::from_utf8_lossy(payload)
            ))
        }
    };
    if let Some(group) = group {
        if message.group != group {
            return None;
        }
    }
    Some(match message.key {
        Some(key) => format!("DEL   {} {}", message.group, key),
        None => format!("CLEAR {}", message.group),
    })
}

pub async fn execute(args: &WatchArgs) -> Result<()> {
    let store = RedisStore::connect_with_messaging(&args.redis, &args.topic)
        .await
        .with_context(|| format!("Failed to connect to {}", args.topic))?;

    let filter = args.group.clone();
    let handler: MessageHandler = Arc::new(move |payload: Vec<u8>| {
        if let Some(line) = describe(&payload, filter.as_deref()) {
            println!("{}", line);
        }
        async {}.boxed()
    });
    let subscription = store.subscribe(handler).await?;

    println!("Watching '{}' (Ctrl-C to stop)", args.topic);
    tokio::signal::ctrl_c().await?;
    subscription.close().await?;
    Ok(())
}
