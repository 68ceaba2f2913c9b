//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存组的构建器。

use super::{CacheKey, CacheValue, Group, GroupCore, Loader};
use crate::backend::{GroupConfig, Store};
use crate::broker::Broker;
use crate::config::{GlobalConfig, GroupSettings};
use crate::error::Result;
use crate::serialization::SerializerEnum;
use crate::sync::SingleFlight;
use futures::future::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// 缓存组构建器
///
/// 默认启用单飞、使用JSON序列化、不绑定消息代理
pub struct GroupBuilder<K, V> {
    name: String,
    store: Arc<dyn Store>,
    loader: Loader<K, V>,
    broker: Option<Arc<dyn Broker>>,
    config: GroupConfig,
    single_flight: bool,
    serializer: SerializerEnum,
}

impl<K: CacheKey, V: CacheValue> GroupBuilder<K, V> {
    /// 创建构建器
    ///
    /// # 参数
    ///
    /// * `name` - 组名，在同一个存储上唯一
    /// * `store` - 存储后端，可被多个组共享
    /// * `loader` - 缓存未命中时调用的加载函数
    pub fn new<F, Fut>(name: impl Into<String>, store: Arc<dyn Store>, loader: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            name: name.into(),
            store,
            loader: Arc::new(move |key| loader(key).boxed()),
            broker: None,
            config: GroupConfig::default(),
            single_flight: true,
            serializer: SerializerEnum::default(),
        }
    }

    /// 绑定消息代理，启用跨实例失效
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn config(mut self, config: GroupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = Some(ttl);
        self
    }

    pub fn cost(mut self, cost: u64) -> Self {
        self.config.cost = Some(cost);
        self
    }

    pub fn single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn serializer(mut self, serializer: SerializerEnum) -> Self {
        self.serializer = serializer;
        self
    }

    /// 应用配置文件中的组配置
    pub fn settings(self, settings: &GroupSettings, global: &GlobalConfig) -> Self {
        let config = settings.group_config(global);
        let single_flight = settings.single_flight(global);
        self.config(config)
            .single_flight(single_flight)
            .serializer(SerializerEnum::from_type(&global.serialization))
    }

    /// 注册组名、配置存储并订阅失效消息
    ///
    /// 任一步失败时组名被释放，不留下半初始化的组
    ///
    /// # 返回值
    ///
    /// 组实例；重复组名、存储不支持的选项返回配置错误，订阅失败返回代理错误
    #[instrument(skip(self), level = "info", fields(group = %self.name))]
    pub async fn build(self) -> Result<Group<K, V>> {
        let store = self.store.clone();
        let name = self.name.clone();
        store.register_group(&name)?;

        let result = self.assemble().await;
        if result.is_err() {
            store.registry().release(&name);
        }
        result
    }

    async fn assemble(self) -> Result<Group<K, V>> {
        let value_type = std::any::type_name::<V>();
        let config = GroupConfig {
            value_type,
            ..self.config
        };
        self.store.configure_group(&self.name, config).await?;

        let core = Arc::new(GroupCore {
            name: self.name,
            store: self.store,
            broker: self.broker,
            loader: self.loader,
            flight: self.single_flight.then(SingleFlight::new),
            serializer: self.serializer,
            value_type,
        });

        let subscription = match &core.broker {
            Some(broker) => Some(broker.subscribe(core.handler()).await?),
            None => None,
        };

        info!(
            "Group '{}' 已创建 (single_flight={}, distributed={})",
            core.name,
            core.flight.is_some(),
            subscription.is_some()
        );

        Ok(Group {
            core,
            subscription: Mutex::new(subscription),
        })
    }
}
