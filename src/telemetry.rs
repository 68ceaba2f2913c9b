//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志和链路追踪的初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// 默认日志过滤规则，可被 `RUST_LOG` 覆盖
pub const DEFAULT_FILTER: &str = "info";

/// 初始化 tracing
///
/// 应在应用程序启动时调用一次；已有全局 subscriber 时不做任何修改。
///
/// # 参数
///
/// * `service_name` - 服务名称，用作 tracer 名称
///
/// # 返回值
///
/// 本次调用是否安装了全局 subscriber
pub fn init_tracing(service_name: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // 未配置导出器时 provider 不会发送任何数据
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// 关闭全局 tracer provider
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
