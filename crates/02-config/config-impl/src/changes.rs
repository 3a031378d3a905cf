//! 配置变更回调注册表
//!
//! 读取配置时可以附带回调：注册时若与上次运行的值不一致立即触发，
//! 之后每次读取到不同的原始值时再次触发。回调在释放锁之后同步调用。

use config_abstractions::{ChangeCallback, ConfigChangeEvent, ConfigChangeEventType, ConfigEventListener};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Registration {
    listener: ChangeCallback,
    last_value: Option<String>,
}

/// 变更回调注册表
#[derive(Default)]
pub struct ChangeRegistry {
    registrations: Mutex<HashMap<(String, String), Vec<Registration>>>,
}

impl ChangeRegistry {
    /// 创建新的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册回调，`current` 为注册时读取到的原始值
    pub fn register(&self, section: &str, key: &str, listener: ChangeCallback, current: Option<String>) {
        debug!("注册配置变更回调 [{}] {}: {}", section, key, listener.name());
        self.registrations
            .lock()
            .entry((section.to_string(), key.to_string()))
            .or_default()
            .push(Registration {
                listener,
                last_value: current,
            });
    }

    /// 报告一次读取，值与上次不同时触发回调
    pub fn observe(&self, section: &str, key: &str, value: Option<&str>, source: &str) -> usize {
        let mut pending = Vec::new();
        {
            let mut registrations = self.registrations.lock();
            let Some(entries) = registrations.get_mut(&(section.to_string(), key.to_string())) else {
                return 0;
            };
            for registration in entries.iter_mut() {
                if registration.last_value.as_deref() != value {
                    let event = ConfigChangeEvent::updated(
                        section,
                        key,
                        registration.last_value.take(),
                        value.map(str::to_string),
                        source,
                    );
                    registration.last_value = value.map(str::to_string);
                    pending.push((registration.listener.clone(), event));
                }
            }
        }
        let fired = pending.len();
        for (listener, event) in pending {
            listener.on_config_changed(&event);
        }
        fired
    }

    /// 已注册回调的数量
    pub fn listener_count(&self) -> usize {
        self.registrations.lock().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for ChangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeRegistry")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// 日志记录监听器
///
/// 将配置变更记录到日志中
pub struct LoggingChangeListener {
    name: String,
}

impl LoggingChangeListener {
    /// 创建新的日志记录监听器
    pub fn new() -> Self {
        Self {
            name: "LoggingChangeListener".to_string(),
        }
    }
}

impl Default for LoggingChangeListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEventListener for LoggingChangeListener {
    fn on_config_changed(&self, event: &ConfigChangeEvent) {
        match event.event_type {
            ConfigChangeEventType::Drift => {
                warn!(
                    "配置与上次运行不一致: [{}] {}: {:?} -> {:?}",
                    event.section, event.key, event.old_value, event.new_value
                );
            }
            ConfigChangeEventType::Updated => {
                info!(
                    "配置更新: [{}] {}: {:?} -> {:?} at {}",
                    event.section, event.key, event.old_value, event.new_value, event.timestamp
                );
            }
        }
        if !event.metadata.is_empty() {
            debug!("事件元数据: {:?}", event.metadata);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 把监听器包装为回调
pub fn callback(listener: impl ConfigEventListener + 'static) -> ChangeCallback {
    Arc::new(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_observe_fires_only_on_new_value() {
        let registry = ChangeRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        registry.register(
            "jobs",
            "wall time",
            callback(move |_: &ConfigChangeEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Some("24:00".to_string()),
        );

        assert_eq!(registry.observe("jobs", "wall time", Some("24:00"), "test"), 0);
        assert_eq!(registry.observe("jobs", "wall time", Some("72:00"), "test"), 1);
        assert_eq!(registry.observe("jobs", "wall time", Some("72:00"), "test"), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observe_unregistered_key() {
        let registry = ChangeRegistry::new();
        assert_eq!(registry.observe("jobs", "retries", Some("3"), "test"), 0);
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn test_logging_listener_name() {
        let listener = LoggingChangeListener::new();
        assert_eq!(listener.name(), "LoggingChangeListener");
    }
}
