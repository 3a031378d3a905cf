//! # Configuration Abstractions
//!
//! 配置引擎的抽象层，定义数据模型和各层之间的约定。
//!
//! ## 核心接口
//!
//! - [`ConfigEntry`] - 单条配置数据及其来源、访问标记
//! - [`EntrySink`] - 可接收配置条目的容器接口
//! - [`ConfigFiller`] - 配置填充器接口
//! - [`ConfigEventListener`] - 配置变更监听接口
//! - [`ConfigValue`] - 字符串与类型化值之间的转换约定

pub mod entry;
pub mod events;
pub mod filler;
pub mod value;

pub use entry::*;
pub use events::*;
pub use filler::*;
pub use value::*;
