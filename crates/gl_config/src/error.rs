// crates/gl_config/src/error.rs

//! 配置层错误类型

use gl_foundation::error::GlError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 类型不匹配
    #[error("配置 '{key}' 类型不匹配: 期望 {expected}, 实际 {found}")]
    TypeMismatch {
        /// 配置键
        key: String,
        /// 期望类型
        expected: &'static str,
        /// 实际类型
        found: &'static str,
    },

    /// 缺失配置
    #[error("缺失配置: {0}")]
    Missing(String),
}

impl ConfigError {
    /// 无效值
    pub fn invalid(key: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for GlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => GlError::io_with_source("读取配置失败", e),
            ConfigError::InvalidValue { key, value, reason } => {
                GlError::invalid_config(key, value, reason)
            }
            other => GlError::config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_foundation::error::ErrorKind;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("grid_Lbz", -1.0, "必须为正");
        assert!(err.to_string().contains("grid_Lbz"));
    }

    #[test]
    fn test_conversion_kind() {
        let err: GlError = ConfigError::Missing("mu_sliding".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err: GlError = ConfigError::invalid("grid_Mbz", 0, "至少为 1").into();
        assert!(matches!(err, GlError::InvalidConfig { .. }));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "x");
        let err: GlError = ConfigError::from(io).into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
