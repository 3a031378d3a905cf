//! 组合层错误类型

use config_common::ConfigError;
use thiserror::Error;

/// 组合层错误
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("日志初始化失败: {message}")]
    LoggingInit { message: String },
}

/// 结果类型别名
pub type CompositionResult<T> = Result<T, CompositionError>;
