//! 32 位有符号整数的紧凑编码。
//!
//! # 线格式（What）
//! - `marker:u8 | payload`，`marker` 取值见 [`super::Marker`]；
//! - 1/2/3 字节载荷容纳 `[-2^(8w-1), 2^(8w-1)-1]` 范围内的值，负数折叠为 `(!v) | 该宽度的符号位`；
//! - 其余值以 4 字节原值写出。总长度因此为 2、3、4 或 5 字节。

use courier_core::Result;

use super::Marker;
use crate::memory::MemoryBuffer;

/// 选择能容纳 `value` 的最小载荷宽度。
fn payload_width(value: i32) -> usize {
    match value {
        -0x80..=0x7F => 1,
        -0x8000..=0x7FFF => 2,
        -0x80_0000..=0x7F_FFFF => 3,
        _ => 4,
    }
}

/// 编码后占用的总字节数（含格式标记）。
pub fn encoded_len(value: i32) -> usize {
    1 + payload_width(value)
}

pub fn write(buffer: &mut MemoryBuffer, value: i32) -> Result<()> {
    let width = payload_width(value);
    let payload = if width == 4 {
        value as u32
    } else if value < 0 {
        (!value) as u32 | (1 << (width * 8 - 1))
    } else {
        value as u32
    };

    let mut frame = [0u8; 5];
    frame[0] = Marker::for_width(width) as u8;
    frame[1..=width].copy_from_slice(&payload.to_be_bytes()[4 - width..]);
    buffer.write_bytes(&frame[..=width])
}

pub fn read(buffer: &mut MemoryBuffer) -> Result<i32> {
    let width = Marker::decode(buffer.read_unsigned_byte()?, "compressed int32")?.width(4);
    let mut bytes = [0u8; 4];
    buffer.read_bytes(&mut bytes[4 - width..])?;
    let payload = u32::from_be_bytes(bytes);
    if width == 4 {
        return Ok(payload as i32);
    }

    let sign_bit = 1u32 << (width * 8 - 1);
    if payload & sign_bit == 0 {
        Ok(payload as i32)
    } else {
        Ok(!((payload ^ sign_bit) as i32))
    }
}
