//! 进程级配置登记表
//!
//! 以 `register` 方式创建的配置会登记在这里，供需要遍历全部配置的工具（如帮助输出）使用。

use config_impl::ConfigInterface;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

static REGISTERED_CONFIGS: Lazy<RwLock<Vec<ConfigInterface>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// 登记配置
pub fn register_config(config: ConfigInterface) {
    debug!("登记配置: {}", config.config_name());
    REGISTERED_CONFIGS.write().push(config);
}

/// 已登记的配置
pub fn registered_configs() -> Vec<ConfigInterface> {
    REGISTERED_CONFIGS.read().clone()
}

/// 按名称查找已登记的配置
pub fn find_registered_config(name: &str) -> Option<ConfigInterface> {
    REGISTERED_CONFIGS
        .read()
        .iter()
        .find(|config| config.config_name() == name)
        .cloned()
}
