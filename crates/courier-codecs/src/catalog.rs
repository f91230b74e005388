//! 类型目录：全限定名到类型描述的登记表。
//!
//! # 设计背景（Why）
//! - 清单只给出类型名，Rust 没有按名称反射构造的能力；应用在启动时把可能出现在清单里的类型
//!   逐一登记到 [`TypeCatalog`]，协议构建时再按清单挑选。
//! - 登记时即把“如何构造、如何编解码”固化为函数指针，运行期不再做任何泛型分派。
//!
//! # 使用方式（How）
//! ```rust
//! use courier_codecs::{TypeCatalog, GenericPacket};
//!
//! let mut catalog = TypeCatalog::new();
//! catalog.declare_packet::<GenericPacket>();
//! assert!(catalog.get("courier::GenericPacket").is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use courier_core::error::codes;
use courier_core::{CoreError, Result};

use crate::codec::{Decoder, Encoder};
use crate::model::{Enumeration, Marshallable, Packet};
use crate::object::{ClassKey, Object, TypeId, Typed, expect_type};
use crate::protocol::Protocol;

pub(crate) type MarshallFn = fn(&dyn Object, &mut Encoder<'_>, &Protocol) -> Result<()>;
pub(crate) type UnmarshallFn = fn(&mut Decoder<'_>, &Protocol) -> Result<Box<dyn Object>>;
pub(crate) type NamedUnmarshallFn =
    fn(String, &mut Decoder<'_>, &Protocol) -> Result<Box<dyn Object>>;

/// 包类型在解码时的构造方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Construction {
    /// 以解码出的包名调用 `From<String>`。
    Named,
    /// 调用 `Default`，包名交由类型自行处理。
    Default,
}

/// 类型的接入方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// 仅登记类型标识，由自定义 Marshaller 负责编码。
    Plain,
    Marshallable { cacheable: bool },
    Packet { construction: Construction },
    Enumeration,
}

#[derive(Clone, Copy)]
pub(crate) struct ObjectCodec {
    pub(crate) marshall: MarshallFn,
    pub(crate) unmarshall: UnmarshallFn,
}

#[derive(Clone, Copy)]
pub(crate) struct PacketCodec {
    pub(crate) name: fn(&dyn Object) -> Result<&str>,
    pub(crate) marshall: MarshallFn,
    pub(crate) unmarshall: NamedUnmarshallFn,
}

#[derive(Clone, Copy)]
pub(crate) struct EnumCodec {
    pub(crate) name: fn(&dyn Object) -> Result<&'static str>,
    pub(crate) from_name: fn(&str) -> Option<Box<dyn Object>>,
}

#[derive(Clone, Copy)]
pub(crate) enum KindCodec {
    Plain,
    Marshallable(ObjectCodec),
    Packet(PacketCodec),
    Enumeration(EnumCodec),
}

/// 一个已登记类型的完整描述。
pub struct TypeDescriptor {
    name: &'static str,
    class: ClassKey,
    type_id: Option<TypeId>,
    kind: TypeKind,
    codec: KindCodec,
}

impl TypeDescriptor {
    fn of<T: Typed>(kind: TypeKind, codec: KindCodec) -> Self {
        Self {
            name: T::TYPE_NAME,
            class: ClassKey::of::<T>(),
            type_id: T::TYPE_ID,
            kind,
            codec,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn class(&self) -> ClassKey {
        self.class
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub(crate) fn codec(&self) -> KindCodec {
        self.codec
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// 名称到类型描述的登记表。同名重复登记时以最后一次为准。
#[derive(Clone, Debug, Default)]
pub struct TypeCatalog {
    entries: HashMap<&'static str, Arc<TypeDescriptor>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记仅需类型标识的类型。
    pub fn declare<T: Typed>(&mut self) -> &mut Self {
        self.insert(TypeDescriptor::of::<T>(TypeKind::Plain, KindCodec::Plain))
    }

    pub fn declare_marshallable<T: Marshallable>(&mut self) -> &mut Self {
        let codec = ObjectCodec {
            marshall: marshall_marshallable::<T>,
            unmarshall: unmarshall_marshallable::<T>,
        };
        self.insert(TypeDescriptor::of::<T>(
            TypeKind::Marshallable {
                cacheable: T::CACHEABLE,
            },
            KindCodec::Marshallable(codec),
        ))
    }

    /// 登记以包名构造的包类型。
    pub fn declare_packet<T: Packet + From<String>>(&mut self) -> &mut Self {
        let codec = PacketCodec {
            name: packet_name::<T>,
            marshall: marshall_packet::<T>,
            unmarshall: unmarshall_named_packet::<T>,
        };
        self.insert(TypeDescriptor::of::<T>(
            TypeKind::Packet {
                construction: Construction::Named,
            },
            KindCodec::Packet(codec),
        ))
    }

    /// 登记以 `Default` 构造的包类型。
    pub fn declare_default_packet<T: Packet + Default>(&mut self) -> &mut Self {
        let codec = PacketCodec {
            name: packet_name::<T>,
            marshall: marshall_packet::<T>,
            unmarshall: unmarshall_default_packet::<T>,
        };
        self.insert(TypeDescriptor::of::<T>(
            TypeKind::Packet {
                construction: Construction::Default,
            },
            KindCodec::Packet(codec),
        ))
    }

    pub fn declare_enumeration<T: Enumeration>(&mut self) -> &mut Self {
        let codec = EnumCodec {
            name: constant_name::<T>,
            from_name: from_constant_name::<T>,
        };
        self.insert(TypeDescriptor::of::<T>(
            TypeKind::Enumeration,
            KindCodec::Enumeration(codec),
        ))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        self.entries.insert(descriptor.name, Arc::new(descriptor));
        self
    }
}

fn marshall_marshallable<T: Marshallable>(
    value: &dyn Object,
    encoder: &mut Encoder<'_>,
    protocol: &Protocol,
) -> Result<()> {
    expect_type::<T>(value)?.marshall(encoder, protocol)
}

fn unmarshall_marshallable<T: Marshallable>(
    decoder: &mut Decoder<'_>,
    protocol: &Protocol,
) -> Result<Box<dyn Object>> {
    let mut value = T::default();
    value.unmarshall(decoder, protocol)?;
    Ok(Box::new(value))
}

fn packet_name<T: Packet>(value: &dyn Object) -> Result<&str> {
    Ok(expect_type::<T>(value)?.packet_name())
}

fn marshall_packet<T: Packet>(
    value: &dyn Object,
    encoder: &mut Encoder<'_>,
    protocol: &Protocol,
) -> Result<()> {
    expect_type::<T>(value)?.marshall(encoder, protocol)
}

fn unmarshall_named_packet<T: Packet + From<String>>(
    name: String,
    decoder: &mut Decoder<'_>,
    protocol: &Protocol,
) -> Result<Box<dyn Object>> {
    let mut value = T::from(name);
    value.unmarshall(decoder, protocol)?;
    Ok(Box::new(value))
}

fn unmarshall_default_packet<T: Packet + Default>(
    _name: String,
    decoder: &mut Decoder<'_>,
    protocol: &Protocol,
) -> Result<Box<dyn Object>> {
    let mut value = T::default();
    value.unmarshall(decoder, protocol)?;
    Ok(Box::new(value))
}

fn constant_name<T: Enumeration>(value: &dyn Object) -> Result<&'static str> {
    Ok(expect_type::<T>(value)?.constant_name())
}

fn from_constant_name<T: Enumeration>(name: &str) -> Option<Box<dyn Object>> {
    T::from_constant_name(name).map(|value| Box::new(value) as Box<dyn Object>)
}

/// 协议中缺少某个类型标识时的统一错误。
pub(crate) fn unknown_type_id(type_id: TypeId) -> CoreError {
    CoreError::new(
        codes::UNKNOWN_TYPE,
        format!("no type registered under type id {type_id}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenericPacket;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Color {
        Red,
        Blue,
    }

    impl Typed for Color {
        const TYPE_NAME: &'static str = "test::Color";
        const TYPE_ID: Option<TypeId> = Some(TypeId::new(3));
    }

    impl Enumeration for Color {
        fn constant_name(&self) -> &'static str {
            match self {
                Color::Red => "Red",
                Color::Blue => "Blue",
            }
        }

        fn from_constant_name(name: &str) -> Option<Self> {
            match name {
                "Red" => Some(Color::Red),
                "Blue" => Some(Color::Blue),
                _ => None,
            }
        }
    }

    #[test]
    fn descriptors_capture_kind_and_identity() {
        let mut catalog = TypeCatalog::new();
        catalog
            .declare_enumeration::<Color>()
            .declare_packet::<GenericPacket>();

        let color = catalog.get("test::Color").expect("枚举登记失败");
        assert_eq!(color.kind(), TypeKind::Enumeration);
        assert_eq!(color.type_id(), Some(TypeId::new(3)));
        assert_eq!(color.class(), ClassKey::of::<Color>());

        let packet = catalog.get(GenericPacket::TYPE_NAME).expect("包登记失败");
        assert_eq!(
            packet.kind(),
            TypeKind::Packet {
                construction: Construction::Named
            }
        );
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn enum_codec_maps_constant_names() {
        let mut catalog = TypeCatalog::new();
        catalog.declare_enumeration::<Color>();
        let KindCodec::Enumeration(codec) = catalog.get("test::Color").expect("登记失败").codec()
        else {
            panic!("枚举类型必须携带枚举编解码");
        };

        assert_eq!((codec.name)(&Color::Blue).expect("读取常量名失败"), "Blue");
        let restored = (codec.from_name)("Red").expect("常量名解析失败");
        assert_eq!(restored.downcast_ref::<Color>(), Some(&Color::Red));
        assert!((codec.from_name)("Green").is_none());
    }
}
