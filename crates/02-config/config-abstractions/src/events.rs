//! 配置变更事件定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 配置变更事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    /// 事件类型
    pub event_type: ConfigChangeEventType,
    /// 节名
    pub section: String,
    /// 键名
    pub key: String,
    /// 旧值
    pub old_value: Option<String>,
    /// 新值
    pub new_value: Option<String>,
    /// 事件时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// 事件来源（视图名称）
    pub source: String,
    /// 额外元数据
    pub metadata: HashMap<String, String>,
}

impl ConfigChangeEvent {
    /// 创建与上次运行配置不一致的事件
    pub fn drift(
        section: impl Into<String>,
        key: impl Into<String>,
        stored: impl Into<String>,
        current: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_type: ConfigChangeEventType::Drift,
            section: section.into(),
            key: key.into(),
            old_value: Some(stored.into()),
            new_value: Some(current.into()),
            timestamp: chrono::Utc::now(),
            source: source.into(),
            metadata: HashMap::new(),
        }
    }

    /// 创建运行期读取到新值的事件
    pub fn updated(
        section: impl Into<String>,
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_type: ConfigChangeEventType::Updated,
            section: section.into(),
            key: key.into(),
            old_value,
            new_value,
            timestamp: chrono::Utc::now(),
            source: source.into(),
            metadata: HashMap::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 配置变更事件类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigChangeEventType {
    /// 当前配置与上次运行保存的配置不同
    Drift,
    /// 同一键在后续读取中观察到不同的原始值
    Updated,
}

/// 配置事件监听器 trait
pub trait ConfigEventListener: Send + Sync {
    /// 处理配置变更事件
    fn on_config_changed(&self, event: &ConfigChangeEvent);

    /// 获取监听器名称
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> ConfigEventListener for F
where
    F: Fn(&ConfigChangeEvent) + Send + Sync,
{
    fn on_config_changed(&self, event: &ConfigChangeEvent) {
        self(event);
    }
}

/// 读取时注册的变更回调
pub type ChangeCallback = Arc<dyn ConfigEventListener>;
