use courier_core::CoreError;
use courier_core::error::codes;
use thiserror::Error;

/// 缓冲与压缩器的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：缓冲越界、访问已释放区域与字节流损坏是三类处置截然不同的故障，
///   分别映射到 `buffer.out_of_bounds`、`buffer.released` 与 `protocol.malformed`。
/// - **契约 (What)**：所有变体都可通过 [`From<BufferError>`](From) 转换为 [`CoreError`]，
///   因此缓冲 API 直接返回 `courier_core::Result`，调用方以 `?` 透传。
/// - **设计权衡 (Trade-offs)**：越界变体携带操作名与游标快照，方便在不复现的情况下定位问题。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// 读写请求超出可用字节。
    #[error("{operation} needs {requested} byte(s) at index {index}, only {available} available")]
    OutOfBounds {
        operation: &'static str,
        index: usize,
        requested: usize,
        available: usize,
    },

    /// 游标设置违反 `0 ≤ reader ≤ writer ≤ capacity`。
    #[error("{operation} index {index} outside of {min}..={max}")]
    InvalidIndex {
        operation: &'static str,
        index: usize,
        min: usize,
        max: usize,
    },

    /// 底层区域已经释放。
    #[error("memory buffer region was already released")]
    Released,

    /// 压缩格式损坏。
    #[error("malformed {format}: {detail}")]
    Malformed {
        format: &'static str,
        detail: String,
    },
}

impl From<BufferError> for CoreError {
    fn from(error: BufferError) -> Self {
        let code = match &error {
            BufferError::OutOfBounds { .. } | BufferError::InvalidIndex { .. } => {
                codes::BUFFER_OUT_OF_BOUNDS
            }
            BufferError::Released => codes::BUFFER_RELEASED,
            BufferError::Malformed { .. } => codes::PROTOCOL_MALFORMED,
        };
        CoreError::new(code, error.to_string())
    }
}
