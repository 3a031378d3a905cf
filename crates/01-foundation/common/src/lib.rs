//! # Config Common
//!
//! 配置引擎各层共享的基础设施。
//!
//! ## 核心组件
//!
//! - [`ConfigError`] - 配置错误分类
//! - [`PluginRegistry`] - 插件搜索路径与插件注册表
//!
//! ## 设计原则
//!
//! - 进程级状态以显式对象建模，通过注入传递
//! - 仅在需要时才回退到进程级默认注册表

pub mod errors;
pub mod plugins;

pub use errors::*;
pub use plugins::*;

use std::sync::Arc;

/// 进程级默认插件注册表
static GLOBAL_PLUGIN_REGISTRY: once_cell::sync::Lazy<Arc<PluginRegistry>> =
    once_cell::sync::Lazy::new(|| Arc::new(PluginRegistry::new()));

/// 获取进程级默认插件注册表
///
/// 未显式注入注册表的工厂使用此实例，搜索路径在进程生命周期内累积。
pub fn global_plugin_registry() -> Arc<PluginRegistry> {
    GLOBAL_PLUGIN_REGISTRY.clone()
}
