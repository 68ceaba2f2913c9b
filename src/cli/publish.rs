//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了发布失效通知命令的实现。

use crate::backend::RedisStore;
use crate::broker::Broker;
use crate::cli::PublishArgs;
use crate::sync::InvalidationMessage;
use anyhow::{Context, Result};
use serde_json::Value;

/// 解析命令行给出的JSON键
///
/// 不是合法JSON的输入按字符串处理，便于直接输入 `bob` 这样的键
pub fn parse_key(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn execute(args: &PublishArgs) -> Result<()> {
    let message = match &args.key {
        Some(raw) => {
            let key = parse_key(raw);
            if key.is_null() {
                anyhow::bail!("key cannot be null; omit --key to clear the group");
            }
            InvalidationMessage::delete(args.group.as_str(), key)
        }
        None => InvalidationMessage::clear(args.group.as_str()),
    };
    let payload = message.to_bytes()?;

    let store = RedisStore::connect_with_messaging(&args.redis, &args.topic)
        .await
        .with_context(|| format!("Failed to connect to {}", args.topic))?;
    store.send(payload.clone()).await?;

    println!(
        "Published to '{}': {}",
        args.topic,
        String::from_utf8_lossy(&payload)
    );
    Ok(())
}
