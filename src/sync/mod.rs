//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块包含加载合并和跨实例失效消息。

pub mod invalidation;
pub mod single_flight;

pub use invalidation::{decode_notice, InvalidationMessage, Notice};
pub use single_flight::SingleFlight;
