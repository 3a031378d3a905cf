//! # Configuration Implementation
//!
//! 分层配置引擎的具体实现：多来源合并、按节回退的视图、类型化访问，
//! 以及冻结时写出快照和检测与上次运行的差异。
//!
//! ## 主要组件
//!
//! - [`ConfigContainer`] - 单代配置的条目容器，负责优先级折叠和插值
//! - [`ConfigView`] - 组合本次/上次运行容器和路径字典的查找视图
//! - [`ConfigInterface`] - 带默认值记录和变更回调的类型化访问接口
//! - [`ConfigFactory`] - 引导顺序编排、冻结与快照写出
//! - [`FileConfigFiller`] / [`DictConfigFiller`] / [`CompatConfigFiller`] - 内置填充器

pub mod changes;
pub mod container;
pub mod factory;
pub mod fillers;
pub mod freeze;
pub mod interface;
pub mod interpolation;
pub mod paths;
pub mod view;
pub mod writer;

pub use changes::*;
pub use container::*;
pub use factory::*;
pub use fillers::*;
pub use freeze::*;
pub use interface::*;
pub use paths::*;
pub use view::*;
pub use writer::*;
