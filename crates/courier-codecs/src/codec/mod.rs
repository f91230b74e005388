//! 编解码门面：[`Encoder`] 与 [`Decoder`]。
//!
//! # 设计背景（Why）
//! - Marshaller 只面对“按字段写值”的接口，不直接接触缓冲与压缩细节；门面统一提供
//!   定长与压缩整数、位集、字符串与嵌套对象的读写。
//! - 门面持有从池中借出的编解码上下文（UTF-8 工作缓冲与调试帧栈），`Drop` 时自动归还，
//!   调用方无需显式释放。
//!
//! # 契约说明（What）
//! - 所有写方法接受字段名，字段名只用于调试帧，不进入字节流；
//! - 读方法按写入顺序调用，类型与顺序都必须和写端一致；
//! - `char` 以 16 位码元传输，超出基本多文种平面的字符写入时返回 `serialization.type_mismatch`；
//! - 嵌套对象的层数受 `max_object_depth` 约束，超出时返回 `protocol.malformed`，
//!   深层嵌套的输入因此以错误返回，而不会耗尽调用栈。

mod debugger;
pub mod utf8;

use courier_buffer::MemoryBuffer;
use courier_buffer::compress::{bitset, int32, int64};
use courier_core::error::codes;
use courier_core::{CoreError, Result};
use tracing::debug;

use crate::object::{Object, downcast_object};
use crate::pool::{ObjectHandler, Pooled};
use crate::protocol::Protocol;

use debugger::{Process, SerializationDebugger};

/// 池化的编解码上下文。
#[derive(Debug)]
pub(crate) struct CodecState {
    scratch: Vec<u8>,
    debugger: SerializationDebugger,
    depth: usize,
    max_depth: usize,
}

impl CodecState {
    /// 进入一层嵌套对象；超过上限时不计数直接失败。
    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(CoreError::new(
                codes::PROTOCOL_MALFORMED,
                format!("object nesting exceeds the limit of {}", self.max_depth),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// 调试模式下为错误附加路径帧，弹出本层帧并退出本层嵌套。
    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        let result = match result {
            Err(err) if self.debugger.enabled() && err.frames().is_empty() => {
                let frames = self.debugger.snapshot();
                debug!(
                    code = err.code(),
                    depth = frames.len(),
                    "serialization failure annotated with object path"
                );
                Err(err.with_frames(frames))
            }
            other => other,
        };
        self.debugger.pop();
        self.depth = self.depth.saturating_sub(1);
        result
    }
}

/// 按配置构造 [`CodecState`] 的对象池钩子。
#[derive(Clone, Copy, Debug)]
pub(crate) struct CodecFactory {
    pub(crate) utf8_buffer_size: usize,
    pub(crate) debug: bool,
    pub(crate) max_object_depth: usize,
}

impl ObjectHandler<CodecState> for CodecFactory {
    fn create(&self) -> CodecState {
        CodecState {
            scratch: vec![0; self.utf8_buffer_size],
            debugger: SerializationDebugger::new(self.debug),
            depth: 0,
            max_depth: self.max_object_depth,
        }
    }

    fn passivate(&self, state: &mut CodecState) {
        state.debugger.clear();
        state.depth = 0;
    }

    fn validate(&self, state: &CodecState) -> bool {
        state.scratch.len() == self.utf8_buffer_size
            && state.max_depth == self.max_object_depth
            && state.depth == 0
            && state.debugger.depth() == 0
    }
}

pub(crate) type CodecLease<'a> = Pooled<'a, CodecState, CodecFactory>;

/// 绑定到一个 [`MemoryBuffer`] 的编码器。
pub struct Encoder<'a> {
    buffer: &'a mut MemoryBuffer,
    protocol: &'a Protocol,
    codec: CodecLease<'a>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(
        buffer: &'a mut MemoryBuffer,
        protocol: &'a Protocol,
        codec: CodecLease<'a>,
    ) -> Self {
        Self {
            buffer,
            protocol,
            codec,
        }
    }

    pub fn protocol(&self) -> &'a Protocol {
        self.protocol
    }

    pub fn buffer(&self) -> &MemoryBuffer {
        &*self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut MemoryBuffer {
        &mut *self.buffer
    }

    pub fn write_bool(&mut self, _field: &str, value: bool) -> Result<()> {
        self.buffer.write_bool(value)
    }

    /// 写入压缩位集，`None` 与空切片编码相同。
    pub fn write_bit_set(&mut self, _field: &str, values: Option<&[bool]>) -> Result<()> {
        bitset::write(self.buffer, values)
    }

    pub fn write_byte(&mut self, _field: &str, value: i8) -> Result<()> {
        self.buffer.write_byte(value)
    }

    pub fn write_unsigned_byte(&mut self, _field: &str, value: u8) -> Result<()> {
        self.buffer.write_unsigned_byte(value)
    }

    /// 写入原始字节，不带长度前缀。
    pub fn write_bytes(&mut self, _field: &str, bytes: &[u8]) -> Result<()> {
        self.buffer.write_bytes(bytes)
    }

    pub fn write_short(&mut self, _field: &str, value: i16) -> Result<()> {
        self.buffer.write_short(value)
    }

    pub fn write_char(&mut self, _field: &str, value: char) -> Result<()> {
        let unit = u16::try_from(u32::from(value)).map_err(|_| {
            CoreError::new(
                codes::TYPE_MISMATCH,
                format!("char {value:?} lies outside the basic multilingual plane"),
            )
        })?;
        self.buffer.write_char(unit)
    }

    pub fn write_int32(&mut self, _field: &str, value: i32) -> Result<()> {
        self.buffer.write_int(value)
    }

    pub fn write_compressed_int32(&mut self, _field: &str, value: i32) -> Result<()> {
        int32::write(self.buffer, value)
    }

    pub fn write_int64(&mut self, _field: &str, value: i64) -> Result<()> {
        self.buffer.write_long(value)
    }

    pub fn write_compressed_int64(&mut self, _field: &str, value: i64) -> Result<()> {
        int64::write(self.buffer, value)
    }

    pub fn write_float(&mut self, _field: &str, value: f32) -> Result<()> {
        self.buffer.write_float(value)
    }

    pub fn write_double(&mut self, _field: &str, value: f64) -> Result<()> {
        self.buffer.write_double(value)
    }

    pub fn write_string(&mut self, _field: &str, value: &str) -> Result<()> {
        utf8::write(self.buffer, value)
    }

    /// 经由协议写出任意对象。
    pub fn write_object(&mut self, field: &str, value: &dyn Object) -> Result<()> {
        let protocol = self.protocol;
        self.codec.enter()?;
        self.codec
            .debugger
            .push(Process::Serialize, field, value.type_name());
        let result = protocol.write_object(field, value, self);
        self.codec.finish(result)
    }

    /// 写出一个字节的存在标志，值存在时随后写出对象。
    pub fn write_nullable_object(&mut self, field: &str, value: Option<&dyn Object>) -> Result<()> {
        match value {
            None => self.buffer.write_bool(false),
            Some(value) => {
                self.buffer.write_bool(true)?;
                self.write_object(field, value)
            }
        }
    }
}

/// 绑定到一个 [`MemoryBuffer`] 的解码器。
pub struct Decoder<'a> {
    buffer: &'a mut MemoryBuffer,
    protocol: &'a Protocol,
    codec: CodecLease<'a>,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(
        buffer: &'a mut MemoryBuffer,
        protocol: &'a Protocol,
        codec: CodecLease<'a>,
    ) -> Self {
        Self {
            buffer,
            protocol,
            codec,
        }
    }

    pub fn protocol(&self) -> &'a Protocol {
        self.protocol
    }

    pub fn buffer(&self) -> &MemoryBuffer {
        &*self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut MemoryBuffer {
        &mut *self.buffer
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.buffer.read_bool()
    }

    pub fn read_bit_set(&mut self) -> Result<Option<Vec<bool>>> {
        bitset::read(self.buffer)
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        self.buffer.read_byte()
    }

    pub fn read_unsigned_byte(&mut self) -> Result<u8> {
        self.buffer.read_unsigned_byte()
    }

    /// 读满 `target`。
    pub fn read_bytes(&mut self, target: &mut [u8]) -> Result<()> {
        self.buffer.read_bytes(target)
    }

    /// 读取 `len` 个原始字节，长度超过剩余可读字节时不做分配。
    pub fn read_byte_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > self.buffer.readable_bytes() {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!(
                    "requested {len} bytes but only {} are readable",
                    self.buffer.readable_bytes()
                ),
            ));
        }
        let mut bytes = vec![0; len];
        self.buffer.read_bytes(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_short(&mut self) -> Result<i16> {
        self.buffer.read_short()
    }

    pub fn read_char(&mut self) -> Result<char> {
        let unit = self.buffer.read_char()?;
        char::from_u32(u32::from(unit)).ok_or_else(|| {
            CoreError::new(
                codes::PROTOCOL_MALFORMED,
                format!("code unit {unit:#06x} is a lone surrogate"),
            )
        })
    }

    pub fn read_int32(&mut self) -> Result<i32> {
        self.buffer.read_int()
    }

    pub fn read_compressed_int32(&mut self) -> Result<i32> {
        int32::read(self.buffer)
    }

    pub fn read_int64(&mut self) -> Result<i64> {
        self.buffer.read_long()
    }

    pub fn read_compressed_int64(&mut self) -> Result<i64> {
        int64::read(self.buffer)
    }

    pub fn read_float(&mut self) -> Result<f32> {
        self.buffer.read_float()
    }

    pub fn read_double(&mut self) -> Result<f64> {
        self.buffer.read_double()
    }

    pub fn read_string(&mut self) -> Result<String> {
        utf8::read(self.buffer, &mut self.codec.scratch)
    }

    /// 经由协议读取任意对象；`field` 只用于调试帧。
    pub fn read_object(&mut self, field: &str) -> Result<Box<dyn Object>> {
        let protocol = self.protocol;
        self.codec.enter()?;
        if self.codec.debugger.enabled() {
            let type_name = protocol.find_type(self).unwrap_or("unknown");
            self.codec
                .debugger
                .push(Process::Deserialize, field, type_name);
        }
        let result = protocol.read_object(self);
        self.codec.finish(result)
    }

    /// 读取对象并取出具体类型 `T`。
    pub fn read_object_as<T: Object>(&mut self, field: &str) -> Result<T> {
        downcast_object(self.read_object(field)?)
    }

    pub fn read_nullable_object(&mut self, field: &str) -> Result<Option<Box<dyn Object>>> {
        if self.buffer.read_bool()? {
            self.read_object(field).map(Some)
        } else {
            Ok(None)
        }
    }
}
