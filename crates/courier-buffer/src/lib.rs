//! `courier-buffer` 提供序列化引擎最底层的字节容器与紧凑编码。
//!
//! # 模块定位（Why）
//! - 所有编码最终都写入 [`MemoryBuffer`]：它以双游标顺序读写，以共享锁计数决定存储何时释放；
//! - 计数、长度与标志位在协议中极其常见，[`compress`] 中的无状态编码把它们压到接近最小的字节数。
//!
//! # 设计概要（How）
//! - `memory` 模块实现基于 `bytes::BytesMut` 的可增长存储，duplicate 视图共享同一区域；
//! - [`compress`] 模块提供 Int32、Int64 与 BitSet 三种编码，全部直接读写 [`MemoryBuffer`]；
//! - 错误经由 [`BufferError`] 统一转换为 `courier_core::CoreError`，调用方以 `?` 透传。

mod error;
mod memory;

pub mod compress;

pub use error::BufferError;
pub use memory::{DEFAULT_MAX_CAPACITY, MemoryBuffer};
