//! 对象模型：可序列化值的统一视图与线上类型标识。
//!
//! # 设计背景（Why）
//! - 协议需要在运行期按“具体类型”挑选 Marshaller，又要把解码结果以统一形态交还调用方；
//!   [`Object`] 以 `Any` 为基础提供这两种能力，任何 `'static + Debug + Send + Sync` 类型都自动满足。
//! - [`TypeId`] 是写在字节流里的 16 位标识；`std::any::TypeId` 只在进程内有意义，
//!   本模块以 [`ClassKey`] 的名字使用它作为缓存键。
//!
//! # 使用提示（How）
//! - `Box<dyn Object>` 本身也满足 `Object`，对装箱值调用 trait 方法前先解引用为 `&dyn Object`，
//!   或使用 `dyn Object` 上的固有方法（[`is`](trait.Object.html#method.is)、`downcast_ref`、`class`）。

use std::any::Any;
use std::fmt;

use courier_core::error::codes;
use courier_core::{CoreError, Result};

/// 进程内的具体类型键。
pub type ClassKey = std::any::TypeId;

/// 写在字节流中的 16 位类型标识。
///
/// 负值保留给内置 Marshaller 与内部类型，应用类型必须使用正值。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(i16);

impl TypeId {
    pub const fn new(raw: i16) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i16 {
        self.0
    }

    /// 是否位于保留给内置类型的非正区间。
    pub const fn is_reserved(self) -> bool {
        self.0 <= 0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 可被协议编码的值。
pub trait Object: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// 具体类型的 Rust 名称，用于诊断信息。
    fn type_name(&self) -> &'static str;
}

impl<T> Object for T
where
    T: Any + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl dyn Object {
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// 具体类型的缓存键。
    pub fn class(&self) -> ClassKey {
        self.as_any().type_id()
    }
}

/// 声明一个类型参与协议注册所需的元数据。
///
/// # 契约说明（What）
/// - `TYPE_NAME`：清单中使用的全限定名，在同一 [`TypeCatalog`](crate::TypeCatalog) 内唯一；
/// - `TYPE_ID`：线上类型标识。缺省为 `None`，出现在清单中的类型若未声明，协议构建会以
///   `config.missing_type_id` 失败。
///
/// # 示例（Examples）
/// ```rust
/// use courier_codecs::{TypeId, Typed};
///
/// #[derive(Debug, Default)]
/// struct Heartbeat;
///
/// impl Typed for Heartbeat {
///     const TYPE_NAME: &'static str = "demo::Heartbeat";
///     const TYPE_ID: Option<TypeId> = Some(TypeId::new(7));
/// }
/// ```
pub trait Typed: Object + Sized {
    const TYPE_NAME: &'static str;
    const TYPE_ID: Option<TypeId> = None;
}

/// 将 `&dyn Object` 视为 `T`，类型不符时返回 `serialization.type_mismatch`。
pub fn expect_type<T: Object>(value: &dyn Object) -> Result<&T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| type_mismatch(std::any::type_name::<T>(), value.type_name()))
}

/// 取出装箱对象中的 `T`。
pub fn downcast_object<T: Object>(object: Box<dyn Object>) -> Result<T> {
    if !object.is::<T>() {
        return Err(type_mismatch(
            std::any::type_name::<T>(),
            (*object).type_name(),
        ));
    }
    Object::into_any(object)
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| type_mismatch(std::any::type_name::<T>(), "unknown"))
}

fn type_mismatch(expected: &str, found: &str) -> CoreError {
    CoreError::new(
        codes::TYPE_MISMATCH,
        format!("expected a value of type `{expected}`, found `{found}`"),
    )
}
