//! 应用模型契约与内置值类型。
//!
//! # 模块定位（Why）
//! - 应用类型以三种方式接入协议：自描述的 [`Marshallable`]、带名称与属性表的 [`Packet`]、
//!   按常量名编码的 [`Enumeration`]；三者都在 [`TypeCatalog`](crate::TypeCatalog) 中登记后生效。
//! - [`Identifier`]、[`Message`] 与 [`GenericPacket`] 是协议自带的值类型，无需登记即可编码。
//!
//! # 线格式（What）
//! - `Marshallable`：类型标识 · 自定义字段；
//! - `Packet`：类型标识 · 包名字符串 · 自定义字段；
//! - `Enumeration`：类型标识 · 常量名字符串；
//! - `Identifier`：16 个原始字节；
//! - `Message`：标识对象 · 正文对象（两者都带 Marshaller 标识）；
//! - `GenericPacket` 的自定义字段：`int32` 条目数 · 逐条（键字符串 · 值对象）。

use std::collections::BTreeMap;
use std::fmt;

use courier_core::error::codes;
use courier_core::{CoreError, Result};

use crate::codec::{Decoder, Encoder};
use crate::object::{Object, TypeId, Typed};
use crate::protocol::Protocol;

/// 自行描述字段布局的类型。
///
/// # 契约说明（What）
/// - 解码时先以 `Default` 构造实例，再调用 [`unmarshall`](Self::unmarshall) 填充；
/// - `CACHEABLE` 为 `true` 时，该类型的 Marshaller 选择结果会写入协议缓存。
pub trait Marshallable: Typed + Default {
    const CACHEABLE: bool = true;

    fn marshall(&self, encoder: &mut Encoder<'_>, protocol: &Protocol) -> Result<()>;

    fn unmarshall(&mut self, decoder: &mut Decoder<'_>, protocol: &Protocol) -> Result<()>;
}

/// 带包名的消息体。
///
/// 构造方式在登记时决定：`declare_packet` 要求 `From<String>`，以解码出的包名构造；
/// `declare_default_packet` 要求 `Default`，包名随后由 [`unmarshall`](Self::unmarshall) 自行处理。
pub trait Packet: Typed {
    fn packet_name(&self) -> &str;

    fn marshall(&self, encoder: &mut Encoder<'_>, protocol: &Protocol) -> Result<()>;

    fn unmarshall(&mut self, decoder: &mut Decoder<'_>, protocol: &Protocol) -> Result<()>;
}

/// 按常量名编码的枚举。
pub trait Enumeration: Typed {
    fn constant_name(&self) -> &'static str;

    fn from_constant_name(name: &str) -> Option<Self>;
}

/// 128 位标识符，线上固定 16 字节。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identifier([u8; 16]);

impl Identifier {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub const fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.as_u128();
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            value >> 96,
            (value >> 80) & 0xffff,
            (value >> 64) & 0xffff,
            (value >> 48) & 0xffff,
            value & 0xffff_ffff_ffff
        )
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

/// 带标识的消息信封，正文可以是任意可编码对象。
#[derive(Debug)]
pub struct Message {
    id: Identifier,
    body: Box<dyn Object>,
}

impl Message {
    pub fn new(id: Identifier, body: impl Object) -> Self {
        Self {
            id,
            body: Box::new(body),
        }
    }

    pub fn from_boxed(id: Identifier, body: Box<dyn Object>) -> Self {
        Self { id, body }
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn body(&self) -> &dyn Object {
        &*self.body
    }

    pub fn into_body(self) -> Box<dyn Object> {
        self.body
    }
}

/// 以字符串为键的通用属性包。
///
/// 键按字典序保存，因此相同内容总是产生相同的字节序列。
#[derive(Debug)]
pub struct GenericPacket {
    name: String,
    values: BTreeMap<String, Box<dyn Object>>,
}

impl GenericPacket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 写入一个属性，返回被替换的旧值。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Object) -> Option<Box<dyn Object>> {
        self.values.insert(key.into(), Box::new(value))
    }

    pub fn get(&self, key: &str) -> Option<&dyn Object> {
        self.values.get(key).map(|value| &**value)
    }

    /// 按具体类型读取属性，缺失或类型不符时返回 `None`。
    pub fn get_as<T: Object>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Object>> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl From<String> for GenericPacket {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl Typed for GenericPacket {
    const TYPE_NAME: &'static str = "courier::GenericPacket";
    const TYPE_ID: Option<TypeId> = Some(crate::marshaller::type_ids::GENERIC_PACKET);
}

impl Packet for GenericPacket {
    fn packet_name(&self) -> &str {
        &self.name
    }

    fn marshall(&self, encoder: &mut Encoder<'_>, _protocol: &Protocol) -> Result<()> {
        let size = i32::try_from(self.values.len()).map_err(|_| {
            CoreError::new(
                codes::PROTOCOL_MALFORMED,
                format!("packet `{}` holds too many values", self.name),
            )
        })?;
        encoder.write_int32("size", size)?;
        for (key, value) in &self.values {
            encoder.write_string("key", key)?;
            encoder.write_object(key, &**value)?;
        }
        Ok(())
    }

    fn unmarshall(&mut self, decoder: &mut Decoder<'_>, _protocol: &Protocol) -> Result<()> {
        let size = decoder.read_int32()?;
        if size < 0 {
            return Err(CoreError::new(
                codes::PROTOCOL_MALFORMED,
                format!("negative value count {size} in packet `{}`", self.name),
            ));
        }
        for _ in 0..size {
            let key = decoder.read_string()?;
            let value = decoder.read_object(&key)?;
            self.values.insert(key, value);
        }
        Ok(())
    }
}
