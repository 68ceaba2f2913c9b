//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的存储后端。配置了主题时，它同时作为失效通知的消息代理。

use super::{GroupConfig, GroupKey, GroupRegistry, Store};
use crate::broker::{spawn_delivery, Broker, MessageHandler, Subscription};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future;
use futures::stream::StreamExt;
use redis::{aio::ConnectionManager, Client};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// 自发消息在回显过滤中保留的时长
const ECHO_WINDOW: Duration = Duration::from_secs(5);

/// 超过该数量时清理过期的待回显记录
const ECHO_PRUNE_THRESHOLD: usize = 1024;

/// 本实例发出、尚未从自己的订阅中收回的消息
///
/// Redis会把消息投递给同一主题上的所有连接，包括发布者自己的订阅连接。
/// 按负载计数，收回一次抵消一次。
#[derive(Default)]
struct EchoFilter {
    pending: DashMap<Vec<u8>, (usize, Instant)>,
}

impl EchoFilter {
    /// 记录即将发出的消息
    fn expect(&self, payload: &[u8]) {
        if self.pending.len() > ECHO_PRUNE_THRESHOLD {
            self.pending
                .retain(|_, (_, sent_at)| sent_at.elapsed() <= ECHO_WINDOW);
        }
        let mut entry = self
            .pending
            .entry(payload.to_vec())
            .or_insert((0, Instant::now()));
        entry.0 += 1;
        entry.1 = Instant::now();
    }

    /// 发布失败，撤销一次记录
    fn forget(&self, payload: &[u8]) {
        self.take(payload);
    }

    /// 收到的消息是否是本实例发出的回显
    fn is_echo(&self, payload: &[u8]) -> bool {
        self.take(payload)
    }

    fn take(&self, payload: &[u8]) -> bool {
        let mut matched = false;
        self.pending.remove_if_mut(payload, |_, (count, sent_at)| {
            if sent_at.elapsed() > ECHO_WINDOW {
                return true;
            }
            matched = true;
            *count -= 1;
            *count == 0
        });
        matched
    }
}

/// 订阅存续期间保持回显过滤器的注册
struct EchoRegistration {
    filters: Arc<DashMap<u64, Arc<EchoFilter>>>,
    id: u64,
}

impl Drop for EchoRegistration {
    fn drop(&mut self) {
        self.filters.remove(&self.id);
    }
}

/// Redis存储后端
///
/// 值按原始字节写入，键为 `"<组名>:<逻辑键>"`。不支持开销提示。
///
/// 作为消息代理时，本实例（及其克隆）的订阅不会收到本实例发出的消息，
/// 与 [`MemoryBroker`](crate::broker::MemoryBroker) 的行为一致。
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    /// 失效通知主题，None 表示未启用消息功能
    topic: Option<String>,
    command_timeout_ms: u64,
    configs: Arc<DashMap<String, GroupConfig>>,
    registry: Arc<GroupRegistry>,
    echo_filters: Arc<DashMap<u64, Arc<EchoFilter>>>,
    next_filter_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("topic", &self.topic)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

impl RedisStore {
    /// 按配置连接Redis
    ///
    /// 连接后执行 PING 检查可用性并记录服务器版本
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let connection_string = config.resolved_connection_string();
        let client = Client::open(connection_string.as_str())?;
        let manager = match tokio::time::timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::Timeout(format!(
                    "Connection timed out after {}ms",
                    config.connection_timeout_ms
                )))
            }
        };

        let store = Self {
            client,
            manager,
            topic: config.topic.clone(),
            command_timeout_ms: config.command_timeout_ms,
            configs: Arc::new(DashMap::new()),
            registry: Arc::new(GroupRegistry::new()),
            echo_filters: Arc::new(DashMap::new()),
            next_filter_id: Arc::new(AtomicU64::new(0)),
        };
        store.ping().await?;
        let version = store.server_version().await?;
        info!(
            "Connected to Redis: version={}, messaging={}",
            version,
            store.topic.is_some()
        );
        Ok(store)
    }

    /// 连接Redis，不启用消息功能
    pub async fn connect(url: &str) -> Result<Self> {
        Self::new(&RedisConfig::from_url(url)).await
    }

    /// 连接Redis，并使用给定主题传递失效通知
    pub async fn connect_with_messaging(url: &str, topic: &str) -> Result<Self> {
        let mut config = RedisConfig::from_url(url);
        config.topic = Some(topic.to_string());
        Self::new(&config).await
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// 检查连接是否正常
    #[instrument(skip(self), level = "debug")]
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let pong: String = self
            .with_timeout(redis::cmd("PING").query_async(&mut conn))
            .await?;
        if pong != "PONG" {
            return Err(CacheError::Store(format!("invalid ping response: {}", pong)));
        }
        Ok(())
    }

    /// 读取服务器版本号
    pub async fn server_version(&self) -> Result<String> {
        let mut conn = self.manager.clone();
        let info: String = self
            .with_timeout(redis::cmd("INFO").arg("server").query_async(&mut conn))
            .await?;
        Ok(parse_server_version(&info).unwrap_or_else(|| "unknown".to_string()))
    }

    fn messaging_topic(&self) -> Result<&str> {
        self.topic.as_deref().ok_or_else(|| {
            CacheError::Configuration(
                "messaging is not configured for this Redis store (no topic)".to_string(),
            )
        })
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(Duration::from_millis(self.command_timeout_ms), fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis command timed out after {}ms",
                self.command_timeout_ms
            ))),
        }
    }
}

/// 从 `INFO server` 的输出中提取 `redis_version`
fn parse_server_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
}

/// 转义 SCAN MATCH 模式中的通配符
fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Store for RedisStore {
    fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    #[instrument(skip(self), level = "debug")]
    async fn configure_group(&self, group_name: &str, config: GroupConfig) -> Result<()> {
        if config.cost.is_some() {
            return Err(CacheError::Configuration(format!(
                "Redis does not support cost hints (group '{}')",
                group_name
            )));
        }
        if let Some(ttl) = config.ttl {
            if ttl.as_millis() == 0 {
                return Err(CacheError::Configuration(format!(
                    "Redis TTL for group '{}' must be at least 1ms",
                    group_name
                )));
            }
        }
        self.configs.insert(group_name.to_string(), config);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &GroupKey) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = self
            .with_timeout(redis::cmd("GET").arg(&key.store_key).query_async(&mut conn))
            .await?;
        debug!(
            "Redis get: key={}, found={}",
            key.store_key,
            value.is_some()
        );
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &GroupKey, value: Vec<u8>) -> Result<()> {
        let ttl = self
            .configs
            .get(&key.group_name)
            .and_then(|c| c.value().ttl);
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key.store_key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        let mut conn = self.manager.clone();
        let _: () = self.with_timeout(cmd.query_async(&mut conn)).await?;
        debug!("Redis set: key={}, ttl={:?}", key.store_key, ttl);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn del(&self, key: &GroupKey) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = self
            .with_timeout(redis::cmd("DEL").arg(&key.store_key).query_async(&mut conn))
            .await?;
        debug!("Redis del: key={}", key.store_key);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self, group_name: &str) -> Result<()> {
        let pattern = format!("{}:*", escape_pattern(group_name));
        let mut conn = self.manager.clone();
        let mut cursor = 0u64;
        let mut removed = 0usize;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .with_timeout(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(1000)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                removed += keys.len();
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.del(key).ignore();
                }
                let _: () = self.with_timeout(pipe.query_async(&mut conn)).await?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        debug!("Redis clear: group={}, removed={}", group_name, removed);
        Ok(())
    }
}

#[async_trait]
impl Broker for RedisStore {
    #[instrument(skip(self, payload), level = "debug")]
    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        let topic = self.messaging_topic()?;
        let filters: Vec<Arc<EchoFilter>> = self
            .echo_filters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for filter in &filters {
            filter.expect(&payload);
        }

        let mut conn = self.manager.clone();
        let published: Result<i64> = self
            .with_timeout(
                redis::cmd("PUBLISH")
                    .arg(topic)
                    .arg(payload.as_slice())
                    .query_async(&mut conn),
            )
            .await;
        let receivers = match published {
            Ok(receivers) => receivers,
            Err(e) => {
                for filter in &filters {
                    filter.forget(&payload);
                }
                return Err(CacheError::Broker(e.to_string()));
            }
        };
        debug!("Redis publish: topic={}, receivers={}", topic, receivers);
        Ok(())
    }

    #[instrument(skip(self, handler), level = "debug")]
    async fn subscribe(&self, handler: MessageHandler) -> Result<Subscription> {
        let topic = self.messaging_topic()?;
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::Broker(format!("pubsub connection failed: {}", e)))?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| CacheError::Broker(format!("subscribe to {} failed: {}", topic, e)))?;
        info!("Redis subscribe: topic={}", topic);

        let filter = Arc::new(EchoFilter::default());
        let id = self.next_filter_id.fetch_add(1, Ordering::Relaxed);
        self.echo_filters.insert(id, filter.clone());
        let registration = EchoRegistration {
            filters: self.echo_filters.clone(),
            id,
        };

        let messages = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .filter(move |payload| {
                let _registration = &registration;
                let echo = filter.is_echo(payload);
                if echo {
                    debug!("Redis subscribe: 跳过自身发出的消息");
                }
                future::ready(!echo)
            })
            .boxed();
        Ok(spawn_delivery(messages, handler))
    }
}
