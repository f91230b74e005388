//! Marshaller 契约与内置实现。
//!
//! # 设计背景（Why）
//! - 协议把“选中哪个 Marshaller”与“如何写字节”分开：前者由过滤链与缓存决定，
//!   后者由本模块的 [`Marshaller`] 实现负责。每个 Marshaller 拥有唯一的 16 位标识，
//!   写在对象字节之前，解码端据此直接查表。
//! - 内置类型全部由 [`BuiltinMarshaller`] 覆盖，以一个枚举承载，避免十几个空结构体。
//!
//! # 内置标识（What）
//! 见 [`type_ids`]。应用自定义 Marshaller 可以使用任何未被占用的标识，
//! 但正值区间同时用于应用类型标识，建议自定义 Marshaller 选用 `-200` 以下的负值。

use courier_core::error::codes;
use courier_core::{CoreError, Result};

use crate::catalog::{KindCodec, TypeDescriptor};
use crate::codec::{Decoder, Encoder};
use crate::model::{Identifier, Message};
use crate::object::{ClassKey, Object, TypeId, expect_type};
use crate::protocol::Protocol;

/// 内置 Marshaller 与内部类型的线上标识。
pub mod type_ids {
    use crate::object::TypeId;

    pub const BYTE: TypeId = TypeId::new(-1);
    pub const SHORT: TypeId = TypeId::new(-2);
    pub const CHAR: TypeId = TypeId::new(-3);
    pub const INT: TypeId = TypeId::new(-4);
    pub const FLOAT: TypeId = TypeId::new(-5);
    pub const LONG: TypeId = TypeId::new(-6);
    pub const DOUBLE: TypeId = TypeId::new(-7);
    pub const STRING: TypeId = TypeId::new(-8);
    pub const BYTE_ARRAY: TypeId = TypeId::new(-9);
    pub const ENUMERATION: TypeId = TypeId::new(-10);
    pub const BOOL: TypeId = TypeId::new(-12);
    pub const IDENTIFIER: TypeId = TypeId::new(-101);
    pub const MESSAGE: TypeId = TypeId::new(-102);
    pub const PACKET: TypeId = TypeId::new(-103);
    pub const MARSHALLABLE: TypeId = TypeId::new(-104);
    /// `GenericPacket` 的类型标识，写在 Packet Marshaller 标识之后。
    pub const GENERIC_PACKET: TypeId = TypeId::new(-1000);
}

/// 一种值的编解码器。
///
/// # 契约说明（What）
/// - [`marshaller_id`](Self::marshaller_id) 返回 `None` 的实现无法注册，协议构建以
///   `config.missing_type_id` 失败；
/// - `marshall` 只写对象本体，Marshaller 标识由协议在调用前写出；
/// - `unmarshall` 读取 `marshall` 写出的全部字节，不多读也不少读；
/// - [`describe`](Self::describe) 仅在调试模式下用于生成路径帧，可以读取字节，
///   协议会在调用后恢复读游标。
pub trait Marshaller: Send + Sync + 'static {
    fn marshaller_id(&self) -> Option<TypeId>;

    fn marshall(
        &self,
        field: &str,
        value: &dyn Object,
        encoder: &mut Encoder<'_>,
        protocol: &Protocol,
    ) -> Result<()>;

    fn unmarshall(&self, decoder: &mut Decoder<'_>, protocol: &Protocol)
    -> Result<Box<dyn Object>>;

    fn describe(&self, _decoder: &mut Decoder<'_>, _protocol: &Protocol) -> Option<&'static str> {
        None
    }
}

/// 协议自带的 Marshaller。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinMarshaller {
    Byte,
    Short,
    Char,
    Int,
    Float,
    Long,
    Double,
    String,
    ByteArray,
    Enumeration,
    Bool,
    Identifier,
    Message,
    Packet,
    Marshallable,
}

impl BuiltinMarshaller {
    pub const ALL: [BuiltinMarshaller; 15] = [
        BuiltinMarshaller::Byte,
        BuiltinMarshaller::Short,
        BuiltinMarshaller::Char,
        BuiltinMarshaller::Int,
        BuiltinMarshaller::Float,
        BuiltinMarshaller::Long,
        BuiltinMarshaller::Double,
        BuiltinMarshaller::String,
        BuiltinMarshaller::ByteArray,
        BuiltinMarshaller::Enumeration,
        BuiltinMarshaller::Bool,
        BuiltinMarshaller::Identifier,
        BuiltinMarshaller::Message,
        BuiltinMarshaller::Packet,
        BuiltinMarshaller::Marshallable,
    ];

    pub const fn id(self) -> TypeId {
        match self {
            BuiltinMarshaller::Byte => type_ids::BYTE,
            BuiltinMarshaller::Short => type_ids::SHORT,
            BuiltinMarshaller::Char => type_ids::CHAR,
            BuiltinMarshaller::Int => type_ids::INT,
            BuiltinMarshaller::Float => type_ids::FLOAT,
            BuiltinMarshaller::Long => type_ids::LONG,
            BuiltinMarshaller::Double => type_ids::DOUBLE,
            BuiltinMarshaller::String => type_ids::STRING,
            BuiltinMarshaller::ByteArray => type_ids::BYTE_ARRAY,
            BuiltinMarshaller::Enumeration => type_ids::ENUMERATION,
            BuiltinMarshaller::Bool => type_ids::BOOL,
            BuiltinMarshaller::Identifier => type_ids::IDENTIFIER,
            BuiltinMarshaller::Message => type_ids::MESSAGE,
            BuiltinMarshaller::Packet => type_ids::PACKET,
            BuiltinMarshaller::Marshallable => type_ids::MARSHALLABLE,
        }
    }

    /// 直接对应某个 Rust 类型的 Marshaller 返回该类型的键，用于预热协议缓存。
    pub(crate) fn class(self) -> Option<ClassKey> {
        let class = match self {
            BuiltinMarshaller::Byte => ClassKey::of::<i8>(),
            BuiltinMarshaller::Short => ClassKey::of::<i16>(),
            BuiltinMarshaller::Char => ClassKey::of::<char>(),
            BuiltinMarshaller::Int => ClassKey::of::<i32>(),
            BuiltinMarshaller::Float => ClassKey::of::<f32>(),
            BuiltinMarshaller::Long => ClassKey::of::<i64>(),
            BuiltinMarshaller::Double => ClassKey::of::<f64>(),
            BuiltinMarshaller::String => ClassKey::of::<String>(),
            BuiltinMarshaller::ByteArray => ClassKey::of::<Vec<u8>>(),
            BuiltinMarshaller::Bool => ClassKey::of::<bool>(),
            BuiltinMarshaller::Identifier => ClassKey::of::<Identifier>(),
            BuiltinMarshaller::Message => ClassKey::of::<Message>(),
            BuiltinMarshaller::Enumeration
            | BuiltinMarshaller::Packet
            | BuiltinMarshaller::Marshallable => return None,
        };
        Some(class)
    }

    fn primitive_name(self) -> &'static str {
        match self {
            BuiltinMarshaller::Byte => "i8",
            BuiltinMarshaller::Short => "i16",
            BuiltinMarshaller::Char => "char",
            BuiltinMarshaller::Int => "i32",
            BuiltinMarshaller::Float => "f32",
            BuiltinMarshaller::Long => "i64",
            BuiltinMarshaller::Double => "f64",
            BuiltinMarshaller::String => "String",
            BuiltinMarshaller::ByteArray => "Vec<u8>",
            BuiltinMarshaller::Bool => "bool",
            BuiltinMarshaller::Identifier => "Identifier",
            BuiltinMarshaller::Message => "Message",
            BuiltinMarshaller::Enumeration => "enumeration",
            BuiltinMarshaller::Packet => "packet",
            BuiltinMarshaller::Marshallable => "marshallable",
        }
    }
}

impl Marshaller for BuiltinMarshaller {
    fn marshaller_id(&self) -> Option<TypeId> {
        Some(self.id())
    }

    fn marshall(
        &self,
        _field: &str,
        value: &dyn Object,
        encoder: &mut Encoder<'_>,
        protocol: &Protocol,
    ) -> Result<()> {
        match self {
            BuiltinMarshaller::Byte => encoder.write_byte("value", *expect_type::<i8>(value)?),
            BuiltinMarshaller::Short => encoder.write_short("value", *expect_type::<i16>(value)?),
            BuiltinMarshaller::Char => encoder.write_char("value", *expect_type::<char>(value)?),
            BuiltinMarshaller::Int => encoder.write_int32("value", *expect_type::<i32>(value)?),
            BuiltinMarshaller::Float => encoder.write_float("value", *expect_type::<f32>(value)?),
            BuiltinMarshaller::Long => encoder.write_int64("value", *expect_type::<i64>(value)?),
            BuiltinMarshaller::Double => {
                encoder.write_double("value", *expect_type::<f64>(value)?)
            }
            BuiltinMarshaller::String => {
                encoder.write_string("value", expect_type::<String>(value)?)
            }
            BuiltinMarshaller::ByteArray => {
                let bytes = expect_type::<Vec<u8>>(value)?;
                encoder.write_int32("length", length_prefix(bytes.len())?)?;
                encoder.write_bytes("bytes", bytes)
            }
            BuiltinMarshaller::Bool => encoder.write_bool("value", *expect_type::<bool>(value)?),
            BuiltinMarshaller::Identifier => {
                encoder.write_bytes("identifier", expect_type::<Identifier>(value)?.as_bytes())
            }
            BuiltinMarshaller::Message => {
                let message = expect_type::<Message>(value)?;
                encoder.write_object("messageId", &message.id())?;
                encoder.write_object("body", message.body())
            }
            BuiltinMarshaller::Enumeration => {
                let KindCodec::Enumeration(codec) = kind_codec(value, protocol)? else {
                    return Err(wrong_kind(value, "an enumeration"));
                };
                protocol.write_type_id(value, encoder)?;
                encoder.write_string("name", (codec.name)(value)?)
            }
            BuiltinMarshaller::Packet => {
                let KindCodec::Packet(codec) = kind_codec(value, protocol)? else {
                    return Err(wrong_kind(value, "a packet"));
                };
                protocol.write_type_id(value, encoder)?;
                encoder.write_string("packetName", (codec.name)(value)?)?;
                (codec.marshall)(value, encoder, protocol)
            }
            BuiltinMarshaller::Marshallable => {
                let KindCodec::Marshallable(codec) = kind_codec(value, protocol)? else {
                    return Err(wrong_kind(value, "a marshallable"));
                };
                protocol.write_type_id(value, encoder)?;
                (codec.marshall)(value, encoder, protocol)
            }
        }
    }

    fn unmarshall(
        &self,
        decoder: &mut Decoder<'_>,
        protocol: &Protocol,
    ) -> Result<Box<dyn Object>> {
        let object: Box<dyn Object> = match self {
            BuiltinMarshaller::Byte => Box::new(decoder.read_byte()?),
            BuiltinMarshaller::Short => Box::new(decoder.read_short()?),
            BuiltinMarshaller::Char => Box::new(decoder.read_char()?),
            BuiltinMarshaller::Int => Box::new(decoder.read_int32()?),
            BuiltinMarshaller::Float => Box::new(decoder.read_float()?),
            BuiltinMarshaller::Long => Box::new(decoder.read_int64()?),
            BuiltinMarshaller::Double => Box::new(decoder.read_double()?),
            BuiltinMarshaller::String => Box::new(decoder.read_string()?),
            BuiltinMarshaller::ByteArray => {
                let length = decoder.read_int32()?;
                let length = usize::try_from(length).map_err(|_| {
                    CoreError::new(
                        codes::PROTOCOL_MALFORMED,
                        format!("negative byte array length {length}"),
                    )
                })?;
                Box::new(decoder.read_byte_vec(length)?)
            }
            BuiltinMarshaller::Bool => Box::new(decoder.read_bool()?),
            BuiltinMarshaller::Identifier => {
                let mut bytes = [0u8; 16];
                decoder.read_bytes(&mut bytes)?;
                Box::new(Identifier::new(bytes))
            }
            BuiltinMarshaller::Message => {
                let id = decoder.read_object_as::<Identifier>("messageId")?;
                let body = decoder.read_object("body")?;
                Box::new(Message::from_boxed(id, body))
            }
            BuiltinMarshaller::Enumeration => {
                let descriptor = protocol.read_type_id(decoder)?;
                let KindCodec::Enumeration(codec) = descriptor.codec() else {
                    return Err(not_of_kind(descriptor, "an enumeration"));
                };
                let name = decoder.read_string()?;
                (codec.from_name)(&name).ok_or_else(|| {
                    CoreError::new(
                        codes::UNKNOWN_TYPE,
                        format!(
                            "enumeration `{}` has no constant named `{name}`",
                            descriptor.name()
                        ),
                    )
                })?
            }
            BuiltinMarshaller::Packet => {
                let descriptor = protocol.read_type_id(decoder)?;
                let KindCodec::Packet(codec) = descriptor.codec() else {
                    return Err(not_of_kind(descriptor, "a packet"));
                };
                let name = decoder.read_string()?;
                (codec.unmarshall)(name, decoder, protocol)?
            }
            BuiltinMarshaller::Marshallable => {
                let descriptor = protocol.read_type_id(decoder)?;
                let KindCodec::Marshallable(codec) = descriptor.codec() else {
                    return Err(not_of_kind(descriptor, "a marshallable"));
                };
                (codec.unmarshall)(decoder, protocol)?
            }
        };
        Ok(object)
    }

    fn describe(&self, decoder: &mut Decoder<'_>, protocol: &Protocol) -> Option<&'static str> {
        match self {
            BuiltinMarshaller::Enumeration
            | BuiltinMarshaller::Packet
            | BuiltinMarshaller::Marshallable => protocol
                .read_type_id(decoder)
                .ok()
                .map(|descriptor| descriptor.name()),
            other => Some(other.primitive_name()),
        }
    }
}

fn kind_codec(value: &dyn Object, protocol: &Protocol) -> Result<KindCodec> {
    protocol
        .descriptor_of(value)
        .map(|descriptor| descriptor.codec())
        .ok_or_else(|| {
            CoreError::new(
                codes::UNKNOWN_TYPE,
                format!("type `{}` is not registered", value.type_name()),
            )
        })
}

fn wrong_kind(value: &dyn Object, expected: &str) -> CoreError {
    CoreError::new(
        codes::UNSUITABLE_MARSHALLER,
        format!("type `{}` is not {expected}", value.type_name()),
    )
}

fn not_of_kind(descriptor: &TypeDescriptor, expected: &str) -> CoreError {
    CoreError::new(
        codes::UNKNOWN_TYPE,
        format!(
            "type `{}` (id {:?}) is not {expected}",
            descriptor.name(),
            descriptor.type_id()
        ),
    )
}

/// 编码端的长度上限与缓冲容量上限一致。
fn length_prefix(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        CoreError::new(
            codes::BUFFER_OUT_OF_BOUNDS,
            format!("byte array of {len} bytes exceeds the int32 length prefix"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_ids_are_unique_and_reserved() {
        let ids: HashSet<_> = BuiltinMarshaller::ALL.iter().map(|m| m.id()).collect();
        assert_eq!(ids.len(), BuiltinMarshaller::ALL.len());
        assert!(ids.iter().all(|id| id.is_reserved()));
        assert!(!ids.contains(&type_ids::GENERIC_PACKET));
    }

    #[test]
    fn oversized_byte_arrays_are_an_encode_side_limit() {
        assert_eq!(length_prefix(16).expect("短数组应可编码"), 16);
        let err = length_prefix(i32::MAX as usize + 1).expect_err("超出 int32 前缀必须失败");
        assert_eq!(err.code(), codes::BUFFER_OUT_OF_BOUNDS);
    }

    #[test]
    fn only_kind_marshallers_lack_a_fixed_class() {
        let without_class: Vec<_> = BuiltinMarshaller::ALL
            .into_iter()
            .filter(|m| m.class().is_none())
            .collect();
        assert_eq!(
            without_class,
            [
                BuiltinMarshaller::Enumeration,
                BuiltinMarshaller::Packet,
                BuiltinMarshaller::Marshallable
            ]
        );
    }
}
