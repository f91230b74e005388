//! 分块 UTF-8 字符串编码。
//!
//! # 线格式（What）
//! `int32 字节长度` · `int32 字节长度`（校验副本） · 若干块；每块为 `int16 块长` · 块内字节。
//! 块长不超过 [`STRING_CHUNK_SIZE`]，且总在字符边界处切分，因此每块本身都是合法 UTF-8。
//!
//! # 实现策略（How）
//! - 编码直接写出 `&str` 的底层字节；
//! - 解码经由调用方提供的工作缓冲逐段搬运，单次读取不超过工作缓冲长度；
//!   长度约束（2 的幂）在配置校验时检查，读取路径不再重复；
//! - 长度副本不一致、块长越界或字节非法都以 `protocol.malformed_text` 失败。

use courier_buffer::MemoryBuffer;
use courier_core::error::codes;
use courier_core::{CoreError, Result};

/// 单块最多携带的字节数。
pub const STRING_CHUNK_SIZE: usize = 16 * 1024;

pub(crate) fn write(buffer: &mut MemoryBuffer, value: &str) -> Result<()> {
    let length = i32::try_from(value.len()).map_err(|_| {
        malformed(format!(
            "string of {} bytes exceeds the int32 length prefix",
            value.len()
        ))
    })?;
    buffer.write_int(length)?;
    buffer.write_int(length)?;

    let mut rest = value;
    while !rest.is_empty() {
        let mut cut = rest.len().min(STRING_CHUNK_SIZE);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (chunk, tail) = rest.split_at(cut);
        buffer.write_short(chunk.len() as i16)?;
        buffer.write_bytes(chunk.as_bytes())?;
        rest = tail;
    }
    Ok(())
}

/// `scratch` 的长度由配置校验保证，任何非空长度都能正确分段拷贝。
pub(crate) fn read(buffer: &mut MemoryBuffer, scratch: &mut [u8]) -> Result<String> {
    debug_assert!(!scratch.is_empty(), "utf-8 working buffer must not be empty");

    let length = buffer.read_int()?;
    let check = buffer.read_int()?;
    if length != check {
        return Err(malformed(format!(
            "string length {length} does not match its check copy {check}"
        )));
    }
    let length = usize::try_from(length)
        .map_err(|_| malformed(format!("negative string length {length}")))?;
    if length > buffer.readable_bytes() {
        return Err(malformed(format!(
            "string length {length} exceeds the {} readable bytes",
            buffer.readable_bytes()
        )));
    }

    let mut bytes = Vec::with_capacity(length);
    while bytes.len() < length {
        let chunk = usize::from(buffer.read_short()? as u16);
        if chunk == 0 || chunk > STRING_CHUNK_SIZE || bytes.len() + chunk > length {
            return Err(malformed(format!(
                "illegal chunk length {chunk} at offset {} of {length}",
                bytes.len()
            )));
        }
        let mut remaining = chunk;
        while remaining > 0 {
            let step = remaining.min(scratch.len());
            buffer.read_bytes(&mut scratch[..step])?;
            bytes.extend_from_slice(&scratch[..step]);
            remaining -= step;
        }
    }

    String::from_utf8(bytes).map_err(|err| malformed("string is not valid UTF-8").with_cause(err))
}

fn malformed(message: impl Into<std::borrow::Cow<'static, str>>) -> CoreError {
    CoreError::new(codes::PROTOCOL_MALFORMED_TEXT, message)
}
