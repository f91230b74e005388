//! `courier-codecs` 在 `courier-buffer` 之上实现对象级序列化。
//!
//! # 模块定位（Why）
//! - 字节容器只懂基本类型；本 crate 负责“任意对象 ↔ 字节流”：登记类型、挑选 Marshaller、
//!   写出标识并递归编码嵌套对象。
//!
//! # 组件关系（How）
//! - [`TypeCatalog`] 登记应用类型，[`ProtocolBuilder`] 按清单挑选并校验，得到只读的 [`Protocol`]；
//! - [`Protocol`] 以“缓存 → 过滤链”选择 [`Marshaller`]，内置类型由 [`BuiltinMarshaller`] 处理；
//! - [`Encoder`]/[`Decoder`] 是 Marshaller 面对的逐字段门面，上下文来自 [`ObjectPool`]；
//! - [`Serializer`] 把以上组件组合为“对象 ↔ 缓冲”的入口。
//!
//! # 线格式约定（What）
//! 每个对象以 16 位 Marshaller 标识开头，随后是该 Marshaller 定义的本体；
//! 可空对象额外在前面写一个字节的存在标志。所有多字节整数均为大端序。

mod catalog;
mod codec;
mod filter;
mod marshaller;
mod model;
mod object;
mod pool;
mod protocol;
mod serializer;

pub use catalog::{Construction, TypeCatalog, TypeDescriptor, TypeKind};
pub use codec::utf8::STRING_CHUNK_SIZE;
pub use codec::{Decoder, Encoder};
pub use filter::{FilterDecision, MarshallerFilter, TypeFilter};
pub use marshaller::{BuiltinMarshaller, Marshaller, type_ids};
pub use model::{Enumeration, GenericPacket, Identifier, Marshallable, Message, Packet};
pub use object::{ClassKey, Object, TypeId, Typed, downcast_object, expect_type};
pub use pool::{ObjectHandler, ObjectPool, PoolStats, Pooled};
pub use protocol::{Protocol, ProtocolBuilder};
pub use serializer::Serializer;
