//! 错误类型定义

use std::path::PathBuf;
use thiserror::Error;

/// 配置错误类型
///
/// 所有错误对当前操作都是终止性的，内部不做重试。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("当前工作目录不存在或不可读: {source}")]
    CurrentDirUnavailable { source: std::io::Error },

    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置文件读取失败: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("配置解析失败: {path}:{line}: {message}")]
    ParseError {
        path: String,
        line: usize,
        message: String,
    },

    #[error("无法解析路径: {path} (搜索路径: {searched:?})")]
    PathNotFound { path: String, searched: Vec<PathBuf> },

    #[error("无法创建{description}: {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        description: String,
        source: std::io::Error,
    },

    #[error("配置写入失败: {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("配置键不存在: [{section}] {key}")]
    KeyNotFound { section: String, key: String },

    #[error("配置类型转换失败: [{section}] {key} = {value:?} 不是有效的{expected}")]
    TypeConversionError {
        section: String,
        key: String,
        value: String,
        expected: String,
    },

    #[error("配置插值存在循环引用: {chain}")]
    InterpolationCycle { chain: String },

    #[error("配置插值嵌套过深: [{section}] {key} 超过 {limit} 层引用")]
    InterpolationTooDeep {
        section: String,
        key: String,
        limit: usize,
    },

    #[error("配置插值引用不存在: [{section}] {key} 引用了 {reference}")]
    UnresolvedReference {
        section: String,
        key: String,
        reference: String,
    },

    #[error("配置容器 {container} 已只读，无法修改 [{section}] {key}")]
    ContainerReadOnly {
        container: String,
        section: String,
        key: String,
    },

    #[error("路径字典已封存，无法设置 {token}")]
    PathDictionarySealed { token: String },

    #[error("找不到{kind}插件: {name}")]
    PluginNotFound { kind: String, name: String },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// 创建类型转换错误
    pub fn type_conversion(
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::TypeConversionError {
            section: section.into(),
            key: key.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// 创建键不存在错误
    pub fn key_not_found(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::KeyNotFound {
            section: section.into(),
            key: key.into(),
        }
    }

    /// 是否为密封后写入导致的错误
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ContainerReadOnly { .. })
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_conversion_names_offending_entry() {
        let err = ConfigError::type_conversion("jobs", "wall time", "abc", "整数");
        let message = err.to_string();
        assert!(message.contains("[jobs] wall time"));
        assert!(message.contains("\"abc\""));
    }

    #[test]
    fn test_read_only_detection() {
        let err = ConfigError::ContainerReadOnly {
            container: "current".to_string(),
            section: "jobs".to_string(),
            key: "retries".to_string(),
        };
        assert!(err.is_read_only());
        assert!(!ConfigError::key_not_found("a", "b").is_read_only());
    }
}
