//! # compress 模块说明
//!
//! ## 角色定位（Why）
//! - 协议里大量出现的计数、长度与标志位通常很小，按固定宽度写出会浪费带宽；
//!   本模块提供无状态的紧凑编码，供 Marshaller 与编解码门面直接调用。
//!
//! ## 组成（What）
//! - [`int32`] / [`int64`]：格式标记 + 1/2/3 字节或全宽载荷；
//! - [`bitset`]：以 Null/Single/Double/Quad 分块打包的布尔序列，支持任意长度续接。
//!
//! ## 约束（How）
//! - 所有函数只读写传入的 [`MemoryBuffer`](crate::MemoryBuffer)，不持有任何状态，可在任意线程调用；
//! - 格式损坏统一报告为 `protocol.malformed`，缓冲越界沿用 `buffer.out_of_bounds`。

pub mod bitset;
pub mod int32;
pub mod int64;

use courier_core::Result;

use crate::error::BufferError;

/// 压缩整数的格式标记，位于编码的第一个字节。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Marker {
    Full = 1,
    Single = 2,
    Double = 3,
    Triple = 4,
}

impl Marker {
    pub(crate) fn for_width(width: usize) -> Self {
        match width {
            1 => Marker::Single,
            2 => Marker::Double,
            3 => Marker::Triple,
            _ => Marker::Full,
        }
    }

    /// 载荷字节数；全宽格式的宽度由调用方给出。
    pub(crate) fn width(self, full_width: usize) -> usize {
        match self {
            Marker::Single => 1,
            Marker::Double => 2,
            Marker::Triple => 3,
            Marker::Full => full_width,
        }
    }

    pub(crate) fn decode(byte: u8, format: &'static str) -> Result<Self> {
        match byte {
            1 => Ok(Marker::Full),
            2 => Ok(Marker::Single),
            3 => Ok(Marker::Double),
            4 => Ok(Marker::Triple),
            other => Err(BufferError::Malformed {
                format,
                detail: format!("unknown format marker {other}"),
            }
            .into()),
        }
    }
}
