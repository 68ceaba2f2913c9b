//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存组的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储缓存组的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "group:layer:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时（累积时间和计数）
    /// key: "group:layer:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `group` - 组名
    /// * `layer` - 层（Store/Loader/Broker）
    /// * `op` - 操作类型
    /// * `result` - 操作结果
    pub fn record_request(&self, group: &str, layer: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "cache_request", group, layer, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}:{}", group, layer, op, result);
        if let Ok(mut map) = self.requests_total.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    /// 记录操作耗时
    pub fn record_duration(&self, group: &str, layer: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}:{}", group, layer, op);
        if let Ok(mut map) = self.operation_duration.lock() {
            let entry = map.entry(key).or_insert((0.0, 0));
            entry.0 += duration_secs;
            entry.1 += 1;
        }
    }

    /// 读取某个请求计数
    pub fn request_count(&self, group: &str, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", group, layer, op, result);
        self.requests_total
            .lock()
            .ok()
            .and_then(|map| map.get(&key).copied())
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为Prometheus文本格式
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    if let Ok(reqs) = metrics.requests_total.lock() {
        let mut entries: Vec<_> = reqs.iter().collect();
        entries.sort();
        for (k, v) in entries {
            let parts: Vec<&str> = k.rsplitn(4, ':').collect();
            if parts.len() == 4 {
                output.push_str(&format!(
                    "cache_requests_total{{group=\"{}\", layer=\"{}\", operation=\"{}\", result=\"{}\"}} {}\n",
                    parts[3], parts[2], parts[1], parts[0], v
                ));
            }
        }
    }

    if let Ok(dur) = metrics.operation_duration.lock() {
        let mut entries: Vec<_> = dur.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (k, (total, count)) in entries {
            let parts: Vec<&str> = k.rsplitn(3, ':').collect();
            if parts.len() == 3 {
                output.push_str(&format!(
                    "cache_operation_duration_seconds_sum{{group=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                    parts[2], parts[1], parts[0], total
                ));
                output.push_str(&format!(
                    "cache_operation_duration_seconds_count{{group=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                    parts[2], parts[1], parts[0], count
                ));
            }
        }
    }
    output
}
