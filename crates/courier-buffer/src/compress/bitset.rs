//! 布尔序列的分块压缩。
//!
//! # 设计背景（Why）
//! - 消息里的可选字段标志、能力位图通常只有几个到几十个布尔值，逐个写字节会放大 8 倍。
//!
//! # 线格式（What）
//! 每个块的最高两位是类型标记，最低位是续接标志（1 表示后面还有块）：
//!
//! | 块 | 宽度 | 布局（高位到低位） |
//! |---|---|---|
//! | Null | 1 字节 | `01 00000 0`，`None` 与空序列共用 |
//! | Single | 1 字节 | `01` · 2 位槽数（1..3） · 3 个值位 · 续接位 |
//! | Double | 2 字节 | `10` · 3 位（槽数 − 3） · 10 个值位 · 续接位 |
//! | Quad | 4 字节 | `11` · 4 位（槽数 − 10） · 25 个值位 · 续接位 |
//!
//! 槽数字段永不为 0，因此 Single 与 Null 可以按“槽数与值位是否全零”区分。
//!
//! # 分块选择（How）
//! 剩余 0 个写 Null；1..=3 写 Single；4..=14 写 Double（11..=14 时先写满 10 个，
//! 下一轮再补一个小块）；15 个及以上写 Quad，每块最多 25 个。

use courier_core::Result;

use crate::error::BufferError;
use crate::memory::MemoryBuffer;

const NULL_CHUNK: u8 = 0b0100_0000;
const MASK_NULL_PAYLOAD: u8 = 0b0011_1110;
const TYPE_SINGLE: u8 = 0b0100_0000;
const TYPE_DOUBLE: u8 = 0b1000_0000;
const TYPE_QUAD: u8 = 0b1100_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Chunk {
    Null,
    Single,
    Double,
    Quad,
}

impl Chunk {
    fn select(remaining: usize) -> Self {
        match remaining {
            0 => Chunk::Null,
            1..=3 => Chunk::Single,
            4..=14 => Chunk::Double,
            _ => Chunk::Quad,
        }
    }

    /// 从块的首字节识别类型，按 Quad、Double、Single/Null 的优先级匹配。
    fn classify(header: u8) -> Result<Self> {
        if header & TYPE_QUAD == TYPE_QUAD {
            Ok(Chunk::Quad)
        } else if header & TYPE_DOUBLE == TYPE_DOUBLE {
            Ok(Chunk::Double)
        } else if header & TYPE_SINGLE == TYPE_SINGLE {
            if header & MASK_NULL_PAYLOAD == 0 {
                Ok(Chunk::Null)
            } else {
                Ok(Chunk::Single)
            }
        } else {
            Err(BufferError::Malformed {
                format: "bit set",
                detail: format!("illegal chunk header {header:#010b}"),
            }
            .into())
        }
    }

    /// `(字节宽度, 类型基值, 槽数字段位移, 槽数字段掩码, 最少槽数, 最多槽数)`
    fn layout(self) -> (usize, u32, u32, u32, usize, usize) {
        match self {
            Chunk::Null => (1, u32::from(NULL_CHUNK), 0, 0, 0, 0),
            Chunk::Single => (1, u32::from(TYPE_SINGLE), 4, 0b11, 1, 3),
            Chunk::Double => (2, u32::from(TYPE_DOUBLE) << 8, 11, 0b111, 4, 10),
            Chunk::Quad => (4, u32::from(TYPE_QUAD) << 24, 26, 0b1111, 11, 25),
        }
    }
}

/// 编码后占用的字节数。
pub fn encoded_len(slots: usize) -> usize {
    let mut remaining = slots;
    let mut total = 0;
    loop {
        let chunk = Chunk::select(remaining);
        let (width, _, _, _, _, max_slots) = chunk.layout();
        total += width;
        remaining -= remaining.min(max_slots);
        if remaining == 0 {
            return total;
        }
    }
}

/// 写入布尔序列；`None` 与空切片都写成单个 Null 块。
pub fn write(buffer: &mut MemoryBuffer, values: Option<&[bool]>) -> Result<()> {
    let values = values.unwrap_or_default();
    if values.is_empty() {
        return buffer.write_unsigned_byte(NULL_CHUNK);
    }

    let mut rest = values;
    while !rest.is_empty() {
        let chunk = Chunk::select(rest.len());
        let (width, base, size_shift, _, min_slots, max_slots) = chunk.layout();
        let used = rest.len().min(max_slots);
        let (head, tail) = rest.split_at(used);

        let mut bits = base | ((used - min_slots + 1) as u32) << size_shift;
        if !tail.is_empty() {
            bits |= 1;
        }
        for (index, &value) in head.iter().enumerate() {
            if value {
                bits |= 1 << (size_shift - 1 - index as u32);
            }
        }
        buffer.write_bytes(&bits.to_be_bytes()[4 - width..])?;
        rest = tail;
    }
    Ok(())
}

/// 读取布尔序列；Null 块解码为 `None`。
pub fn read(buffer: &mut MemoryBuffer) -> Result<Option<Vec<bool>>> {
    let mut values = Vec::new();
    loop {
        let chunk = Chunk::classify(buffer.peek_byte()?)?;
        if chunk == Chunk::Null {
            if values.is_empty() {
                buffer.read_unsigned_byte()?;
                return Ok(None);
            }
            return Err(BufferError::Malformed {
                format: "bit set",
                detail: "null chunk after a continuation flag".to_owned(),
            }
            .into());
        }

        let (width, _, size_shift, size_mask, min_slots, _) = chunk.layout();
        let mut bytes = [0u8; 4];
        buffer.read_bytes(&mut bytes[4 - width..])?;
        let bits = u32::from_be_bytes(bytes);

        let slots = ((bits >> size_shift) & size_mask) as usize + min_slots - 1;
        values.extend(
            (0..slots).map(|index| (bits >> (size_shift - 1 - index as u32)) & 1 == 1),
        );
        if bits & 1 == 0 {
            return Ok(Some(values));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::error::codes;

    fn encode(values: Option<&[bool]>) -> MemoryBuffer {
        let mut buffer = MemoryBuffer::with_capacity(16);
        write(&mut buffer, values).expect("位集写入失败");
        buffer
    }

    #[test]
    fn null_and_empty_share_the_null_chunk() {
        for input in [None, Some(&[][..])] {
            let mut buffer = encode(input);
            assert_eq!(&buffer.to_bytes().expect("导出失败")[..], &[NULL_CHUNK]);
            assert_eq!(read(&mut buffer).expect("读取失败"), None);
        }
    }

    #[test]
    fn three_values_fit_in_one_byte() {
        let values = [true, false, true];
        let mut buffer = encode(Some(&values[..]));
        assert_eq!(
            &buffer.to_bytes().expect("导出失败")[..],
            &[0b0111_1010]
        );
        assert_eq!(read(&mut buffer).expect("读取失败"), Some(values.to_vec()));
    }

    #[test]
    fn eleven_values_use_double_then_single() {
        let values: Vec<bool> = (0..11).map(|i| i % 3 == 0).collect();
        let mut buffer = encode(Some(&values[..]));
        assert_eq!(buffer.writer_index(), 3);
        assert_eq!(encoded_len(11), 3);
        assert_eq!(read(&mut buffer).expect("读取失败"), Some(values));
    }

    #[test]
    fn chunk_sizes_follow_the_selector() {
        let expectations = [
            (1, 1),
            (3, 1),
            (4, 2),
            (10, 2),
            (13, 3),
            (14, 4),
            (15, 4),
            (25, 4),
            (26, 5),
            (40, 8),
        ];
        for (slots, bytes) in expectations {
            let values = vec![true; slots];
            let mut buffer = encode(Some(&values[..]));
            assert_eq!(buffer.writer_index(), bytes, "槽数 {slots} 的编码长度不符");
            assert_eq!(encoded_len(slots), bytes);
            assert_eq!(read(&mut buffer).expect("读取失败"), Some(values));
        }
    }

    #[test]
    fn header_without_type_bits_is_malformed() {
        let mut buffer = MemoryBuffer::from_bytes(&[0b0010_0000]);
        let err = read(&mut buffer).expect_err("非法块头必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_MALFORMED);
    }
}
