use std::borrow::Cow;
use std::error::Error;
use std::fmt;

/// 底层原因的统一装箱形态。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `CoreError` 是序列化引擎所有可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 缓冲、压缩器、类型注册与编解码门面分布在不同 crate 中，调用方需要一个稳定的错误码
///   才能区分“缓冲越界”“未知类型”“配置缺失”等处置完全不同的故障。
/// - 调试模式要求在失败时附带当前对象路径，但不得改变错误码；因此路径被建模为独立的
///   `frames` 字段，而非拼接进 `message`。
///
/// # 逻辑解析（How）
/// - `code` 始终为 `'static` 字符串，取自 [`codes`] 模块；`message` 面向排障人员。
/// - `cause` 通过 [`Error::source`] 暴露，`frames` 由调试器在错误冒泡时一次性写入。
///
/// # 契约说明（What）
/// - **前置条件**：调用方应使用 [`codes`] 中的常量或遵循 `<域>.<语义>` 约定的自定义码值。
/// - **后置条件**：除非显式调用 `with_*` 方法，错误不携带底层原因与对象路径。
///
/// # 设计取舍与风险（Trade-offs）
/// - 消息使用 `Cow<'static, str>`，静态文案零分配，动态上下文按需分配一次。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    frames: Vec<String>,
}

impl CoreError {
    /// 构造核心错误。
    ///
    /// # 示例（Examples）
    /// ```rust
    /// use courier_core::CoreError;
    /// use courier_core::error::codes;
    ///
    /// let err = CoreError::new(codes::UNKNOWN_TYPE, "type id 42 is not registered");
    /// assert_eq!(err.code(), codes::UNKNOWN_TYPE);
    /// assert!(err.cause().is_none(), "初始错误默认不含底层原因");
    /// assert!(err.frames().is_empty());
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            frames: Vec::new(),
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 为现有错误设置底层原因。
    pub fn set_cause(&mut self, cause: impl Error + Send + Sync + 'static) {
        self.cause = Some(Box::new(cause));
    }

    /// 写入调试器记录的对象路径。
    ///
    /// # 契约说明（What）
    /// - `frames` 按“最内层在前”排列，例如
    ///   `[SERIALIZE => inner (i32)]`、`[SERIALIZE => outer (demo::Order)]`。
    /// - 仅首次写入生效：错误在嵌套调用栈中逐层冒泡时，外层调试器不会覆盖内层已记录的完整路径。
    /// - 错误码保持不变。
    pub fn with_frames(mut self, frames: Vec<String>) -> Self {
        if self.frames.is_empty() {
            self.frames = frames;
        }
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 调试模式下记录的对象路径，未启用调试时为空。
    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        for frame in &self.frames {
            write!(f, "\n    at {frame}")?;
        }
        Ok(())
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 序列化引擎内置的错误码常量集合。
///
/// # 设计背景（Why）
/// - 错误码遵循 `<领域>.<语义>` 命名约定，调用方据此决定是丢弃连接、回退配置还是修复数据源。
///
/// # 契约说明（What）
/// - `buffer.*`：内存缓冲的越界与释放语义；
/// - `serialization.*`：类型注册与 Marshaller 调度；
/// - `protocol.*`：字节流本身损坏（压缩整数标记、位集头部、文本长度等）；
/// - `config.*`：协议构建期或配置加载期的失败，出现时不会产生任何半成品实例。
pub mod codes {
    /// 读写越过缓冲游标或容量上限。
    pub const BUFFER_OUT_OF_BOUNDS: &str = "buffer.out_of_bounds";
    /// 访问已释放的缓冲，或在释放后再次 `lock`/`release`。
    pub const BUFFER_RELEASED: &str = "buffer.released";
    /// 解码时遇到未注册的 TypeId。
    pub const UNKNOWN_TYPE: &str = "serialization.unknown_type";
    /// 编码时没有任何过滤器接受该值。
    pub const UNSUITABLE_MARSHALLER: &str = "serialization.unsuitable_marshaller";
    /// Marshaller 收到了与其声明不符的值。
    pub const TYPE_MISMATCH: &str = "serialization.type_mismatch";
    /// 字节流结构损坏。
    pub const PROTOCOL_MALFORMED: &str = "protocol.malformed";
    /// 字符串长度校验失败或内容不是合法 UTF-8。
    pub const PROTOCOL_MALFORMED_TEXT: &str = "protocol.malformed_text";
    /// 类型或 Marshaller 缺少显式 TypeId。
    pub const CONFIG_MISSING_TYPE_ID: &str = "config.missing_type_id";
    /// 同一协议内 TypeId 或类型被重复注册。
    pub const CONFIG_DUPLICATE_TYPE_ID: &str = "config.duplicate_type_id";
    /// 应用类型使用了保留给内置类型的非正 TypeId。
    pub const CONFIG_RESERVED_TYPE_ID: &str = "config.reserved_type_id";
    /// 清单中的类型名无法在类型目录中解析。
    pub const CONFIG_UNKNOWN_TYPE_NAME: &str = "config.unknown_type_name";
    /// 配置项取值非法。
    pub const CONFIG_INVALID: &str = "config.invalid";
    /// 配置文本无法解析。
    pub const CONFIG_PARSE: &str = "config.parse";
    /// 配置或清单文件读取失败。
    pub const CONFIG_IO: &str = "config.io";
}

/// 统一的结果别名。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;
