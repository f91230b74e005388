//! 协议：类型表、Marshaller 表、过滤链与选择缓存。
//!
//! # 设计背景（Why）
//! - 编码任意对象时，协议先确定 Marshaller，写出其标识，再交由 Marshaller 写本体；
//!   解码端读标识、查表、调用对应 Marshaller，双方只需共享同一份注册信息。
//! - 选择过程按“缓存 → 过滤链”进行，命中缓存的类型不再执行任何过滤器。
//!
//! # 构建流程（How）
//! 1. [`ProtocolBuilder`] 按清单从 [`TypeCatalog`] 取出类型，校验标识存在、为正且不重复；
//! 2. 注册全部内置 Marshaller，并以基础类型预热缓存；
//! 3. 为已登记的包、可编组类型与枚举生成内部过滤器，排在所有自定义过滤器之前；
//! 4. 追加自定义 `(过滤器, Marshaller)` 对，保持注册顺序。
//!
//! # 并发契约（Trade-offs）
//! - 构建完成后除缓存外全部只读；缓存使用 `DashMap`，写入采用“已存在则保留”语义，
//!   并发首次命中同一类型的线程得到相同的结果。

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use courier_core::error::codes;
use courier_core::{CoreError, Result, TypeManifest};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::catalog::{TypeCatalog, TypeDescriptor, TypeKind, unknown_type_id};
use crate::codec::{Decoder, Encoder};
use crate::filter::{FilterDecision, KindFilter, MarshallerFilter};
use crate::marshaller::{BuiltinMarshaller, Marshaller};
use crate::model::GenericPacket;
use crate::object::{ClassKey, Object, TypeId, Typed};

/// 选中的 Marshaller 及其线上标识。
#[derive(Clone)]
struct Dispatch {
    id: TypeId,
    marshaller: Arc<dyn Marshaller>,
}

/// 协议实例，构建后可在线程间共享。
pub struct Protocol {
    types_by_id: HashMap<TypeId, Arc<TypeDescriptor>>,
    types_by_class: HashMap<ClassKey, Arc<TypeDescriptor>>,
    marshallers: HashMap<TypeId, Arc<dyn Marshaller>>,
    filters: Vec<(Box<dyn MarshallerFilter>, Dispatch)>,
    cache: DashMap<ClassKey, Dispatch>,
}

impl Protocol {
    pub fn builder(catalog: TypeCatalog) -> ProtocolBuilder {
        ProtocolBuilder::new(catalog)
    }

    /// 选出适用于 `value` 的 Marshaller。
    ///
    /// # 错误
    /// - 缓存未命中且没有过滤器接受时返回 `serialization.unsuitable_marshaller`。
    pub fn marshaller_for(&self, value: &dyn Object) -> Result<Arc<dyn Marshaller>> {
        self.compute_dispatch(value).map(|dispatch| dispatch.marshaller)
    }

    /// 写出 Marshaller 标识与对象本体。
    ///
    /// 调用方通常使用 [`Encoder::write_object`]，后者在调试模式下额外记录路径帧。
    pub fn write_object(
        &self,
        field: &str,
        value: &dyn Object,
        encoder: &mut Encoder<'_>,
    ) -> Result<()> {
        let dispatch = self.compute_dispatch(value)?;
        encoder.write_short("marshallerId", dispatch.id.get())?;
        dispatch.marshaller.marshall(field, value, encoder, self)
    }

    /// 读取 Marshaller 标识并解码对象。
    pub fn read_object(&self, decoder: &mut Decoder<'_>) -> Result<Box<dyn Object>> {
        let id = TypeId::new(decoder.read_short()?);
        let marshaller = self.marshallers.get(&id).cloned().ok_or_else(|| {
            CoreError::new(
                codes::UNKNOWN_TYPE,
                format!("no marshaller registered under id {id}"),
            )
        })?;
        marshaller.unmarshall(decoder, self)
    }

    /// 写出 `value` 已登记的类型标识。
    pub fn write_type_id(&self, value: &dyn Object, encoder: &mut Encoder<'_>) -> Result<()> {
        let type_id = self
            .descriptor_of(value)
            .and_then(|descriptor| descriptor.type_id())
            .ok_or_else(|| {
                CoreError::new(
                    codes::UNKNOWN_TYPE,
                    format!("type `{}` has no registered type id", value.type_name()),
                )
            })?;
        encoder.write_short("typeId", type_id.get())
    }

    /// 读取类型标识并返回对应的类型描述。
    pub fn read_type_id(&self, decoder: &mut Decoder<'_>) -> Result<&TypeDescriptor> {
        let type_id = TypeId::new(decoder.read_short()?);
        self.types_by_id
            .get(&type_id)
            .map(|descriptor| &**descriptor)
            .ok_or_else(|| unknown_type_id(type_id))
    }

    /// 窥视下一个对象的类型名，读游标在返回前恢复原位。
    ///
    /// 标识未知或字节不足时返回 `None`。
    pub fn find_type(&self, decoder: &mut Decoder<'_>) -> Option<&'static str> {
        let start = decoder.buffer().reader_index();
        let name = decoder
            .read_short()
            .ok()
            .and_then(|raw| self.marshallers.get(&TypeId::new(raw)).cloned())
            .and_then(|marshaller| marshaller.describe(decoder, self));
        if decoder.buffer_mut().set_reader_index(start).is_err() {
            return None;
        }
        name
    }

    /// 写出可空标志，值存在时随后写出对象。
    pub fn write_nullable(
        &self,
        field: &str,
        value: Option<&dyn Object>,
        encoder: &mut Encoder<'_>,
    ) -> Result<()> {
        encoder.write_nullable_object(field, value)
    }

    pub fn read_nullable(&self, decoder: &mut Decoder<'_>) -> Result<Option<Box<dyn Object>>> {
        decoder.read_nullable_object("value")
    }

    pub fn descriptor_of(&self, value: &dyn Object) -> Option<&TypeDescriptor> {
        self.types_by_class.get(&value.class()).map(|d| &**d)
    }

    pub fn descriptor_by_id(&self, type_id: TypeId) -> Option<&TypeDescriptor> {
        self.types_by_id.get(&type_id).map(|d| &**d)
    }

    pub fn type_count(&self) -> usize {
        self.types_by_id.len()
    }

    pub fn marshaller_count(&self) -> usize {
        self.marshallers.len()
    }

    /// 当前缓存的类型数量，包含构建时预热的基础类型。
    pub fn cached_classes(&self) -> usize {
        self.cache.len()
    }

    fn compute_dispatch(&self, value: &dyn Object) -> Result<Dispatch> {
        let class = value.class();
        if let Some(hit) = self.cache.get(&class) {
            return Ok(hit.value().clone());
        }

        for (filter, dispatch) in &self.filters {
            match filter.accept(value) {
                FilterDecision::Next => continue,
                FilterDecision::Accepted => return Ok(dispatch.clone()),
                FilterDecision::AcceptedAndCache => {
                    let cached = self
                        .cache
                        .entry(class)
                        .or_insert_with(|| dispatch.clone())
                        .value()
                        .clone();
                    trace!(
                        type_name = value.type_name(),
                        marshaller_id = cached.id.get(),
                        "marshaller selection cached"
                    );
                    return Ok(cached);
                }
            }
        }

        Err(CoreError::new(
            codes::UNSUITABLE_MARSHALLER,
            format!("no suitable marshaller found for type `{}`", value.type_name()),
        ))
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("types", &self.types_by_id.len())
            .field("marshallers", &self.marshallers.len())
            .field("filters", &self.filters.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// [`Protocol`] 的构建器。
pub struct ProtocolBuilder {
    catalog: TypeCatalog,
    manifest: TypeManifest,
    custom: Vec<(Box<dyn MarshallerFilter>, Arc<dyn Marshaller>)>,
}

impl ProtocolBuilder {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            manifest: TypeManifest::default(),
            custom: Vec::new(),
        }
    }

    /// 追加清单条目，重复名称只保留首次出现。
    pub fn manifest(mut self, manifest: TypeManifest) -> Self {
        self.manifest.extend(manifest);
        self
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.manifest.push(name);
        self
    }

    /// 注册自定义 Marshaller，排在已注册的自定义对之后。
    pub fn marshaller(
        mut self,
        filter: impl MarshallerFilter + 'static,
        marshaller: impl Marshaller,
    ) -> Self {
        self.custom.push((Box::new(filter), Arc::new(marshaller)));
        self
    }

    /// 校验并生成协议。
    ///
    /// 协议自带的类型（如 `courier::GenericPacket`）总会注册，清单中列出它们时直接跳过。
    ///
    /// # 错误
    /// - 清单名称未在目录中登记：`config.unknown_type_name`；
    /// - 类型或 Marshaller 未声明标识：`config.missing_type_id`；
    /// - 应用类型标识不为正：`config.reserved_type_id`；
    /// - 标识冲突：`config.duplicate_type_id`。
    pub fn build(self) -> Result<Protocol> {
        let mut types_by_id = HashMap::new();
        let mut types_by_class = HashMap::new();

        let mut internal = TypeCatalog::new();
        internal.declare_packet::<GenericPacket>();
        if let Some(generic) = internal.get(GenericPacket::TYPE_NAME) {
            register_type(&mut types_by_id, &mut types_by_class, generic)?;
        }

        for name in self.manifest.entries() {
            if internal.get(name).is_some() {
                continue;
            }
            let descriptor = self.catalog.get(name).ok_or_else(|| {
                CoreError::new(
                    codes::CONFIG_UNKNOWN_TYPE_NAME,
                    format!("type `{name}` is listed in the manifest but was never declared"),
                )
            })?;
            match descriptor.type_id() {
                None => {
                    return Err(CoreError::new(
                        codes::CONFIG_MISSING_TYPE_ID,
                        format!("type `{name}` does not declare a type id"),
                    ));
                }
                Some(type_id) if type_id.is_reserved() => {
                    return Err(CoreError::new(
                        codes::CONFIG_RESERVED_TYPE_ID,
                        format!("type `{name}` uses reserved type id {type_id}"),
                    ));
                }
                Some(_) => register_type(&mut types_by_id, &mut types_by_class, descriptor)?,
            }
        }

        let mut marshallers: HashMap<TypeId, Arc<dyn Marshaller>> = HashMap::new();
        let cache = DashMap::new();
        let mut builtins = HashMap::new();
        for builtin in BuiltinMarshaller::ALL {
            let marshaller: Arc<dyn Marshaller> = Arc::new(builtin);
            let dispatch = Dispatch {
                id: builtin.id(),
                marshaller: Arc::clone(&marshaller),
            };
            marshallers.insert(builtin.id(), marshaller);
            if let Some(class) = builtin.class() {
                cache.insert(class, dispatch.clone());
            }
            builtins.insert(builtin, dispatch);
        }

        let mut packets = KindFilter::default();
        let mut marshallables = KindFilter::default();
        let mut enumerations = KindFilter::default();
        for descriptor in types_by_id.values() {
            match descriptor.kind() {
                TypeKind::Plain => {}
                TypeKind::Packet { .. } => {
                    packets.insert(descriptor.class(), FilterDecision::AcceptedAndCache);
                }
                TypeKind::Marshallable { cacheable } => {
                    let decision = if cacheable {
                        FilterDecision::AcceptedAndCache
                    } else {
                        FilterDecision::Accepted
                    };
                    marshallables.insert(descriptor.class(), decision);
                }
                TypeKind::Enumeration => {
                    enumerations.insert(descriptor.class(), FilterDecision::AcceptedAndCache);
                }
            }
        }

        let mut filters: Vec<(Box<dyn MarshallerFilter>, Dispatch)> = Vec::new();
        for (filter, builtin) in [
            (packets, BuiltinMarshaller::Packet),
            (marshallables, BuiltinMarshaller::Marshallable),
            (enumerations, BuiltinMarshaller::Enumeration),
        ] {
            if filter.is_empty() {
                continue;
            }
            if let Some(dispatch) = builtins.get(&builtin) {
                filters.push((Box::new(filter), dispatch.clone()));
            }
        }

        for (filter, marshaller) in self.custom {
            let id = marshaller.marshaller_id().ok_or_else(|| {
                CoreError::new(
                    codes::CONFIG_MISSING_TYPE_ID,
                    "custom marshaller does not declare a marshaller id",
                )
            })?;
            match marshallers.entry(id) {
                Entry::Occupied(_) => {
                    return Err(CoreError::new(
                        codes::CONFIG_DUPLICATE_TYPE_ID,
                        format!("marshaller id {id} is already registered"),
                    ));
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&marshaller));
                }
            }
            filters.push((filter, Dispatch { id, marshaller }));
        }

        debug!(
            types = types_by_id.len(),
            marshallers = marshallers.len(),
            filters = filters.len(),
            "protocol built"
        );

        Ok(Protocol {
            types_by_id,
            types_by_class,
            marshallers,
            filters,
            cache,
        })
    }
}

fn register_type(
    by_id: &mut HashMap<TypeId, Arc<TypeDescriptor>>,
    by_class: &mut HashMap<ClassKey, Arc<TypeDescriptor>>,
    descriptor: &Arc<TypeDescriptor>,
) -> Result<()> {
    let Some(type_id) = descriptor.type_id() else {
        return Err(CoreError::new(
            codes::CONFIG_MISSING_TYPE_ID,
            format!("type `{}` does not declare a type id", descriptor.name()),
        ));
    };
    if let Some(existing) = by_id.get(&type_id) {
        return Err(CoreError::new(
            codes::CONFIG_DUPLICATE_TYPE_ID,
            format!(
                "type id {type_id} is claimed by both `{}` and `{}`",
                existing.name(),
                descriptor.name()
            ),
        ));
    }
    if by_class.contains_key(&descriptor.class()) {
        return Err(CoreError::new(
            codes::CONFIG_DUPLICATE_TYPE_ID,
            format!("type `{}` is registered twice", descriptor.name()),
        ));
    }
    by_id.insert(type_id, Arc::clone(descriptor));
    by_class.insert(descriptor.class(), Arc::clone(descriptor));
    Ok(())
}
