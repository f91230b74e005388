//! `courier-core` 定义序列化引擎各 crate 共享的错误域与配置契约。
//!
//! # 模块定位（Why）
//! - 缓冲、压缩器与编解码门面需要同一套稳定错误码，才能让上层统一处置“越界”“未知类型”等故障；
//! - 协议构建所需的类型清单、池容量与调试开关需要一个显式传递的配置对象，而不是进程级全局状态。
//!
//! # 设计概要（How）
//! - [`error`] 提供 [`CoreError`]、错误码常量与 [`Result`] 别名；
//! - [`config`] 提供基于 serde/TOML 的 [`SerializationConfig`] 与逐行书写的 [`TypeManifest`]。

pub mod config;
pub mod error;

pub use config::{ConfigError, SerializationConfig, TypeManifest};
pub use error::{CoreError, Result};
