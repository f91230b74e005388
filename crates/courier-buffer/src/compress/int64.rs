//! 64 位有符号整数的紧凑编码。
//!
//! # 线格式（What）
//! - `marker:u8 | payload`，载荷为 1/2/3 字节或全宽 8 字节，大端序；
//! - 载荷首字节最高位为符号标志，次高位为取反标志，其余位承载幅值；
//! - 当补码的有效位严格少于原值时写入取反后的幅值，`2^k - 1` 这类“略低于 2 的幂”的值
//!   因此只需要很少的位。
//!
//! # 不变量
//! - 原值与补码在第 62 位上必然一个为 0，因此选中的幅值最多 62 位，全宽载荷总能容纳。

use courier_core::Result;

use super::Marker;
use crate::memory::MemoryBuffer;

const MAGNITUDE_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// 编码前的拆分结果。
struct Split {
    sign: bool,
    inverted: bool,
    magnitude: u64,
}

fn split(value: i64) -> Split {
    let raw = value as u64;
    let plain = raw & MAGNITUDE_MASK;
    let complement = !raw & MAGNITUDE_MASK;
    let inverted = complement.leading_zeros() > plain.leading_zeros();
    Split {
        sign: raw >> 63 == 1,
        inverted,
        magnitude: if inverted { complement } else { plain },
    }
}

fn payload_width(magnitude: u64) -> usize {
    (1..=3)
        .find(|width| magnitude < 1 << (width * 8 - 2))
        .unwrap_or(8)
}

/// 编码后占用的总字节数（含格式标记）。
pub fn encoded_len(value: i64) -> usize {
    1 + payload_width(split(value).magnitude)
}

pub fn write(buffer: &mut MemoryBuffer, value: i64) -> Result<()> {
    let Split {
        sign,
        inverted,
        magnitude,
    } = split(value);
    let width = payload_width(magnitude);
    let flags = (u64::from(sign) << 1 | u64::from(inverted)) << (width * 8 - 2);
    let payload = flags | magnitude;

    let mut frame = [0u8; 9];
    frame[0] = Marker::for_width(width) as u8;
    frame[1..=width].copy_from_slice(&payload.to_be_bytes()[8 - width..]);
    buffer.write_bytes(&frame[..=width])
}

pub fn read(buffer: &mut MemoryBuffer) -> Result<i64> {
    let width = Marker::decode(buffer.read_unsigned_byte()?, "compressed int64")?.width(8);
    let mut bytes = [0u8; 8];
    buffer.read_bytes(&mut bytes[8 - width..])?;
    let payload = u64::from_be_bytes(bytes);

    let shift = width * 8 - 2;
    let sign = (payload >> (shift + 1)) & 1;
    let inverted = (payload >> shift) & 1 == 1;
    let magnitude = payload & ((1 << shift) - 1);
    let bits = if inverted {
        !magnitude & MAGNITUDE_MASK
    } else {
        magnitude
    };
    Ok((bits | sign << 63) as i64)
}
