//! 序列化入口。
//!
//! # 设计背景（Why）
//! - 调用方通常只关心“对象 ↔ 缓冲”，[`Serializer`] 把协议、编解码上下文池与缓冲容量配置
//!   组合在一起，对外只暴露少量方法；
//! - 需要逐字段控制时，通过 [`Serializer::retrieve_encoder`]/[`Serializer::retrieve_decoder`]
//!   借出绑定到指定缓冲的门面，离开作用域即归还上下文。
//!
//! # 使用方式（How）
//! ```rust
//! use courier_codecs::{ProtocolBuilder, Serializer, TypeCatalog};
//! use courier_core::SerializationConfig;
//!
//! let config = SerializationConfig::default();
//! let serializer = Serializer::from_config(&config, ProtocolBuilder::new(TypeCatalog::new()))
//!     .expect("构建序列化器失败");
//! let mut buffer = serializer.write_object("greeting", &String::from("hello")).expect("编码失败");
//! let decoded: String = serializer.read_object_as(&mut buffer).expect("解码失败");
//! assert_eq!(decoded, "hello");
//! ```

use std::sync::Arc;

use courier_buffer::MemoryBuffer;
use courier_core::{Result, SerializationConfig};
use tracing::debug;

use crate::codec::{CodecFactory, CodecState, Decoder, Encoder};
use crate::object::{Object, downcast_object};
use crate::pool::{ObjectPool, PoolStats};
use crate::protocol::{Protocol, ProtocolBuilder};

/// 协议与编解码上下文池的组合。
pub struct Serializer {
    protocol: Arc<Protocol>,
    pool: ObjectPool<CodecState, CodecFactory>,
    initial_buffer_capacity: usize,
    max_buffer_capacity: usize,
}

impl Serializer {
    /// 以已构建的协议创建序列化器。
    ///
    /// # 错误
    /// - 配置未通过 [`SerializationConfig::validate`] 时返回 `config.invalid`。
    pub fn new(protocol: Arc<Protocol>, config: &SerializationConfig) -> Result<Self> {
        config.validate()?;
        let factory = CodecFactory {
            utf8_buffer_size: config.utf8_buffer_size,
            debug: config.debug,
            max_object_depth: config.max_object_depth,
        };
        let pool = ObjectPool::new(config.codec_pool_capacity, factory);
        debug!(
            pool_capacity = pool.capacity(),
            utf8_buffer_size = config.utf8_buffer_size,
            debug = config.debug,
            max_object_depth = config.max_object_depth,
            "serializer ready"
        );
        Ok(Self {
            protocol,
            pool,
            initial_buffer_capacity: config.initial_buffer_capacity,
            max_buffer_capacity: config.max_buffer_capacity,
        })
    }

    /// 把配置中的类型清单并入 `builder`，构建协议并创建序列化器。
    pub fn from_config(config: &SerializationConfig, builder: ProtocolBuilder) -> Result<Self> {
        config.validate()?;
        let protocol = builder.manifest(config.type_manifest()?).build()?;
        Self::new(Arc::new(protocol), config)
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn retrieve_encoder<'a>(&'a self, buffer: &'a mut MemoryBuffer) -> Encoder<'a> {
        Encoder::new(buffer, &self.protocol, self.pool.acquire())
    }

    pub fn retrieve_decoder<'a>(&'a self, buffer: &'a mut MemoryBuffer) -> Decoder<'a> {
        Decoder::new(buffer, &self.protocol, self.pool.acquire())
    }

    /// 按配置的容量分配新缓冲并写入对象。
    pub fn write_object(&self, field: &str, value: &dyn Object) -> Result<MemoryBuffer> {
        let mut buffer =
            MemoryBuffer::with_max_capacity(self.initial_buffer_capacity, self.max_buffer_capacity);
        self.write_object_into(field, value, &mut buffer)?;
        Ok(buffer)
    }

    pub fn write_object_into(
        &self,
        field: &str,
        value: &dyn Object,
        buffer: &mut MemoryBuffer,
    ) -> Result<()> {
        self.retrieve_encoder(buffer).write_object(field, value)
    }

    pub fn read_object(&self, buffer: &mut MemoryBuffer) -> Result<Box<dyn Object>> {
        self.retrieve_decoder(buffer).read_object("value")
    }

    pub fn read_object_as<T: Object>(&self, buffer: &mut MemoryBuffer) -> Result<T> {
        downcast_object(self.read_object(buffer)?)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("protocol", &self.protocol)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeCatalog;
    use courier_core::error::codes;

    fn serializer(config: &SerializationConfig) -> Serializer {
        Serializer::from_config(config, ProtocolBuilder::new(TypeCatalog::new()))
            .expect("构建序列化器失败")
    }

    #[test]
    fn primitives_round_trip_through_fresh_buffers() {
        let serializer = serializer(&SerializationConfig::default());
        let mut buffer = serializer.write_object("answer", &42_i64).expect("编码失败");
        assert_eq!(buffer.writer_index(), 2 + 8);
        assert_eq!(serializer.read_object_as::<i64>(&mut buffer).expect("解码失败"), 42);
    }

    #[test]
    fn codecs_return_to_the_pool() {
        let config = SerializationConfig {
            codec_pool_capacity: 2,
            ..SerializationConfig::default()
        };
        let serializer = serializer(&config);
        for _ in 0..10 {
            serializer.write_object("flag", &true).expect("编码失败");
        }
        let stats = serializer.pool_stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.intermediate, 0);
    }

    #[test]
    fn invalid_working_buffer_is_rejected() {
        let config = SerializationConfig {
            utf8_buffer_size: 1000,
            ..SerializationConfig::default()
        };
        let err = Serializer::from_config(&config, ProtocolBuilder::new(TypeCatalog::new()))
            .expect_err("非法工作缓冲必须失败");
        assert_eq!(err.code(), codes::CONFIG_INVALID);
    }
}
