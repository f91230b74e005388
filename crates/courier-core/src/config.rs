//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 序列化域只需要少量旋钮：类型清单、编解码器池容量、UTF-8 工作缓冲大小、调试开关与
//!   默认缓冲容量。将它们集中到 [`SerializationConfig`]，由宿主在启动时构造一次并显式传递，
//!   避免任何进程级全局注册表。
//!
//! ## 设计要求（What）
//! - 配置以 TOML 描述，未知字段直接拒绝，缺省字段回落到 [`Default`]；
//! - [`SerializationConfig::validate`] 在构建协议之前完成全部数值检查；
//! - 类型清单既可内联在 `types` 数组中，也可指向逐行书写类型名的清单文件。

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::error::{CoreError, codes};

/// 默认的编解码器池容量。
pub const DEFAULT_CODEC_POOL_CAPACITY: usize = 100;
/// 默认的 UTF-8 工作缓冲大小，必须为 2 的幂。
pub const DEFAULT_UTF8_BUFFER_SIZE: usize = 1024;
/// 默认的新建缓冲初始容量。
pub const DEFAULT_INITIAL_BUFFER_CAPACITY: usize = 256;
/// 默认的对象嵌套深度上限。
pub const DEFAULT_MAX_OBJECT_DEPTH: usize = 128;
/// 缓冲容量的硬上限，与 32 位长度前缀保持一致。
pub const MAX_BUFFER_CAPACITY: usize = i32::MAX as usize;

/// 配置加载与校验阶段的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“文本解析失败”“文件读取失败”“取值非法”三类问题，便于运维在
///   启动日志中快速定位是格式问题还是部署问题。
/// - **契约 (What)**：通过 [`From<ConfigError>`](From) 转换为 [`CoreError`]，
///   错误码分别为 `config.parse`、`config.io`、`config.invalid`。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 文本不符合 [`SerializationConfig`] 的结构。
    #[error("failed to parse serialization config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 配置或清单文件无法读取。
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 字段取值违反约束。
    #[error("invalid value for `{field}`: {detail}")]
    Invalid { field: &'static str, detail: String },
}

impl From<ConfigError> for CoreError {
    fn from(error: ConfigError) -> Self {
        let code = match &error {
            ConfigError::Parse(_) => codes::CONFIG_PARSE,
            ConfigError::Io { .. } => codes::CONFIG_IO,
            ConfigError::Invalid { .. } => codes::CONFIG_INVALID,
        };
        CoreError::new(code, error.to_string()).with_cause(error)
    }
}

/// 序列化域的完整配置。
///
/// # 设计背景（Why）
/// - 协议、编解码器池与调试器都依赖这些参数；集中建模后，测试与生产使用同一入口构造。
///
/// # 契约说明（What）
/// - `types`：内联类型清单，元素为类型的全限定名；
/// - `manifest`：可选的清单文件路径，内容与 `types` 合并，文件条目排在后面；
/// - `codec_pool_capacity`：编解码器池的槽位数，构造时向上取整到 2 的幂；
/// - `utf8_buffer_size`：每个编解码器持有的 UTF-8 工作缓冲大小，必须为 2 的幂；
/// - `debug`：开启后在失败时附带对象路径；
/// - `initial_buffer_capacity` / `max_buffer_capacity`：`Serializer::write_object` 新建缓冲时使用；
/// - `max_object_depth`：单次编解码中嵌套对象的最大层数，超出时以 `protocol.malformed` 失败，
///   防止恶意帧以深层嵌套耗尽调用栈。
///
/// # 示例（Examples）
/// ```rust
/// use courier_core::SerializationConfig;
///
/// let config = SerializationConfig::from_toml_str(
///     r#"
///     types = ["demo::Order"]
///     debug = true
///     "#,
/// )
/// .expect("配置应可解析");
/// assert!(config.debug);
/// assert_eq!(config.utf8_buffer_size, 1024);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializationConfig {
    pub types: Vec<String>,
    pub manifest: Option<PathBuf>,
    pub codec_pool_capacity: usize,
    pub utf8_buffer_size: usize,
    pub debug: bool,
    pub initial_buffer_capacity: usize,
    pub max_buffer_capacity: usize,
    pub max_object_depth: usize,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            manifest: None,
            codec_pool_capacity: DEFAULT_CODEC_POOL_CAPACITY,
            utf8_buffer_size: DEFAULT_UTF8_BUFFER_SIZE,
            debug: false,
            initial_buffer_capacity: DEFAULT_INITIAL_BUFFER_CAPACITY,
            max_buffer_capacity: MAX_BUFFER_CAPACITY,
            max_object_depth: DEFAULT_MAX_OBJECT_DEPTH,
        }
    }
}

impl SerializationConfig {
    /// 从 TOML 文本解析并校验配置。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件解析并校验配置。
    ///
    /// 相对的 `manifest` 路径按配置文件所在目录解析。
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_file(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(manifest), Some(parent)) = (config.manifest.as_ref(), path.parent()) {
            if manifest.is_relative() {
                config.manifest = Some(parent.join(manifest));
            }
        }
        Ok(config)
    }

    /// 检查所有数值约束。
    ///
    /// # 契约说明（What）
    /// - `utf8_buffer_size` 必须是不小于 8 的 2 的幂；
    /// - `codec_pool_capacity` 必须大于 0；
    /// - `initial_buffer_capacity ≤ max_buffer_capacity ≤ i32::MAX`；
    /// - `max_object_depth` 必须大于 0。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.utf8_buffer_size < 8 || !self.utf8_buffer_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "utf8_buffer_size",
                detail: format!(
                    "must be a power of two and at least 8, was {}",
                    self.utf8_buffer_size
                ),
            });
        }
        if self.codec_pool_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "codec_pool_capacity",
                detail: "must be greater than zero".to_owned(),
            });
        }
        if self.max_object_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_object_depth",
                detail: "must be greater than zero".to_owned(),
            });
        }
        if self.max_buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "max_buffer_capacity",
                detail: format!("must not exceed {MAX_BUFFER_CAPACITY}"),
            });
        }
        if self.initial_buffer_capacity > self.max_buffer_capacity {
            return Err(ConfigError::Invalid {
                field: "initial_buffer_capacity",
                detail: format!(
                    "{} exceeds max_buffer_capacity {}",
                    self.initial_buffer_capacity, self.max_buffer_capacity
                ),
            });
        }
        Ok(())
    }

    /// 合并内联类型与清单文件，得到最终的类型清单。
    pub fn type_manifest(&self) -> Result<TypeManifest, ConfigError> {
        let mut manifest = TypeManifest::from_names(self.types.iter().cloned());
        if let Some(path) = &self.manifest {
            manifest.extend(TypeManifest::parse(&read_file(path)?));
        }
        Ok(manifest)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// 类型清单：参与协议注册的全限定类型名，保持声明顺序且去重。
///
/// 文本格式为每行一个类型名，`#` 之后的内容视为注释，空行忽略。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeManifest {
    entries: Vec<String>,
}

impl TypeManifest {
    pub fn parse(text: &str) -> Self {
        Self::from_names(text.lines().filter_map(|line| {
            let line = match line.find('#') {
                Some(comment) => &line[..comment],
                None => line,
            };
            let name = line.trim();
            (!name.is_empty()).then(|| name.to_owned())
        }))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut manifest = Self::default();
        for name in names {
            manifest.push(name);
        }
        manifest
    }

    /// 追加一个类型名；已存在的名字会被忽略。
    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.entries.contains(&name) {
            self.entries.push(name);
        }
    }

    pub fn extend(&mut self, other: TypeManifest) {
        for name in other.entries {
            self.push(name);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
