// crates/gl_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `GlError` 枚举和 `GlResult` 类型别名，用于整个项目的错误处理。
//!
//! # 错误分类
//!
//! 每个错误都属于一个 [`ErrorKind`]，运行终止时按类别报告：
//!
//! | 类别 | 含义 |
//! |------|------|
//! | `InvalidInput` | 参数超出定义域（负时间步、E < 0 等） |
//! | `ContractViolation` | 在契约禁止的状态下调用（时间不连续、CFL 超限） |
//! | `Configuration` | 无法识别的选项值或不兼容的选项组合 |
//! | `Io` | 输入/输出归档问题 |
//! | `NumericalFailure` | 迭代求解不收敛 |
//! | `InvariantViolation` | 缺少必需的外部字段 |
//!
//! # 示例
//!
//! ```
//! use gl_foundation::error::{GlError, GlResult, ErrorKind};
//!
//! fn check_dt(dt: f64) -> GlResult<()> {
//!     if dt < 0.0 {
//!         return Err(GlError::invalid_input(format!("负时间步 dt = {dt}")));
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(check_dt(-1.0).unwrap_err().kind(), ErrorKind::InvalidInput);
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type GlResult<T> = Result<T, GlError>;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 参数超出定义域
    InvalidInput,
    /// 违反调用契约
    ContractViolation,
    /// 配置错误
    Configuration,
    /// 输入输出错误
    Io,
    /// 数值失败
    NumericalFailure,
    /// 不变量被破坏（缺少必需字段等）
    InvariantViolation,
    /// 内部错误
    Internal,
}

impl ErrorKind {
    /// 类别名称（用于终止信息）
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid-input",
            Self::ContractViolation => "contract-violation",
            Self::Configuration => "configuration-error",
            Self::Io => "io-error",
            Self::NumericalFailure => "numerical-failure",
            Self::InvariantViolation => "invariant-violation",
            Self::Internal => "internal-error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Glacier 错误类型
#[derive(Error, Debug)]
pub enum GlError {
    // ========================================================================
    // 输入与契约
    // ========================================================================

    /// 无效输入
    #[error("无效的输入: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 违反调用契约
    #[error("违反调用契约: {message}")]
    ContractViolation {
        /// 具体描述
        message: String,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    // ========================================================================
    // 配置
    // ========================================================================

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    // ========================================================================
    // 字段
    // ========================================================================

    /// 缺少必需字段
    #[error("缺少必需字段: {name} ({context})")]
    MissingField {
        /// 字段名
        name: String,
        /// 需要该字段的组件
        context: String,
    },

    // ========================================================================
    // IO
    // ========================================================================

    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    // ========================================================================
    // 数值与并行
    // ========================================================================

    /// 数值失败
    #[error("数值失败: {message}")]
    NumericalFailure {
        /// 失败描述
        message: String,
    },

    /// 其他 worker 上发生的失败
    #[error("并行区段在 worker {ranks:?} 上失败")]
    RemoteFailure {
        /// 失败的 worker 编号
        ranks: Vec<usize>,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl GlError {
    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 违反调用契约
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 缺少必需字段
    pub fn missing_field(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            name: name.into(),
            context: context.into(),
        }
    }

    /// IO 错误
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// IO 错误（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 文件不存在
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 数值失败
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::NumericalFailure {
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::ContractViolation { .. } => ErrorKind::ContractViolation,
            Self::SizeMismatch { .. } | Self::IndexOutOfBounds { .. } => {
                ErrorKind::ContractViolation
            }
            Self::Config { .. } | Self::InvalidConfig { .. } => ErrorKind::Configuration,
            Self::MissingField { .. } => ErrorKind::InvariantViolation,
            Self::Io { .. } | Self::FileNotFound { .. } | Self::Serialization { .. } => {
                ErrorKind::Io
            }
            Self::NumericalFailure { .. } => ErrorKind::NumericalFailure,
            Self::RemoteFailure { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl GlError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> GlResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for GlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// 条件不满足时提前返回错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

/// 解包 `Option`，为 `None` 时提前返回错误
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err),
        }
    };
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GlError::config("测试配置错误");
        assert!(err.to_string().contains("配置错误"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(GlError::invalid_input("x").kind(), ErrorKind::InvalidInput);
        assert_eq!(GlError::contract("x").kind(), ErrorKind::ContractViolation);
        assert_eq!(
            GlError::missing_field("enthalpy", "SIA").kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(GlError::file_not_found("/a").kind(), ErrorKind::Io);
        assert_eq!(GlError::numerical("diverged").kind(), ErrorKind::NumericalFailure);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::ContractViolation.name(), "contract-violation");
        assert_eq!(ErrorKind::Configuration.to_string(), "configuration-error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: GlError = io_err.into();
        assert!(matches!(err, GlError::Io { .. }));
    }

    #[test]
    fn test_check_size() {
        assert!(GlError::check_size("test", 10, 10).is_ok());
        assert!(GlError::check_size("test", 10, 5).is_err());
    }

    #[test]
    fn test_ensure_macro() {
        fn check(value: i32) -> GlResult<()> {
            ensure!(value > 0, GlError::invalid_input("value must be positive"));
            Ok(())
        }

        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }

    #[test]
    fn test_require_macro() {
        fn get_value(opt: Option<i32>) -> GlResult<i32> {
            let v = require!(opt, GlError::missing_field("value", "test"));
            Ok(v)
        }

        assert_eq!(get_value(Some(42)).unwrap(), 42);
        assert!(get_value(None).is_err());
    }
}
