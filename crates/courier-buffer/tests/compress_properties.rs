//! 紧凑编码的属性测试。
//!
//! # 测试目标
//! - 任意 `i32`/`i64` 往返后保持不变，且编码长度与 `encoded_len` 预测一致；
//! - 任意长度的布尔序列往返后保持不变，空序列与 `None` 都还原为 `None`；
//! - 多个编码首尾相接写入同一缓冲时，解码端能逐个还原且恰好读完全部字节。

use courier_buffer::MemoryBuffer;
use courier_buffer::compress::{bitset, int32, int64};
use proptest::prelude::*;

proptest! {
    #[test]
    fn int32_round_trips_with_predicted_width(value in any::<i32>()) {
        let mut buffer = MemoryBuffer::with_capacity(8);
        int32::write(&mut buffer, value).expect("写入失败");
        prop_assert_eq!(buffer.writer_index(), int32::encoded_len(value));
        prop_assert_eq!(int32::read(&mut buffer).expect("读取失败"), value);
        prop_assert!(!buffer.readable());
    }

    #[test]
    fn int64_round_trips_with_predicted_width(value in any::<i64>()) {
        let mut buffer = MemoryBuffer::with_capacity(16);
        int64::write(&mut buffer, value).expect("写入失败");
        prop_assert_eq!(buffer.writer_index(), int64::encoded_len(value));
        prop_assert_eq!(int64::read(&mut buffer).expect("读取失败"), value);
        prop_assert!(!buffer.readable());
    }

    #[test]
    fn bitset_round_trips(values in proptest::collection::vec(any::<bool>(), 0..300)) {
        let mut buffer = MemoryBuffer::with_capacity(8);
        bitset::write(&mut buffer, Some(&values[..])).expect("写入失败");
        prop_assert_eq!(buffer.writer_index(), bitset::encoded_len(values.len()));

        let decoded = bitset::read(&mut buffer).expect("读取失败");
        if values.is_empty() {
            prop_assert_eq!(decoded, None);
        } else {
            prop_assert_eq!(decoded, Some(values));
        }
        prop_assert!(!buffer.readable());
    }

    #[test]
    fn mixed_stream_decodes_in_order(
        small in any::<i32>(),
        large in any::<i64>(),
        flags in proptest::collection::vec(any::<bool>(), 1..40),
    ) {
        let mut buffer = MemoryBuffer::with_capacity(4);
        int32::write(&mut buffer, small).expect("写入 int32 失败");
        bitset::write(&mut buffer, Some(&flags[..])).expect("写入位集失败");
        int64::write(&mut buffer, large).expect("写入 int64 失败");

        prop_assert_eq!(int32::read(&mut buffer).expect("读取 int32 失败"), small);
        prop_assert_eq!(bitset::read(&mut buffer).expect("读取位集失败"), Some(flags));
        prop_assert_eq!(int64::read(&mut buffer).expect("读取 int64 失败"), large);
        prop_assert_eq!(buffer.readable_bytes(), 0);
    }
}
