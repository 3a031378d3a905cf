//! 类型化配置访问接口
//!
//! 每次读取都会把调用方的默认值记录为默认来源的条目，
//! 冻结时据此区分“用户显式配置”和“沿用默认值”。

use crate::paths::{resolve_path, WORKDIR_TOKEN};
use crate::view::{ConfigView, Generation};
use config_abstractions::{
    normalize_key, ChangeCallback, ConfigChangeEvent, ConfigValue, EntryOp, EntrySource,
};
use config_common::{ConfigError, ConfigResult, PluginHandle, PluginRegistry};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 读取选项
#[derive(Clone, Default)]
pub struct ReadOptions {
    persistent: bool,
    on_change: Option<ChangeCallback>,
}

impl ReadOptions {
    /// 创建默认读取选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 标记为持久化，冻结时总是写出
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// 附加变更回调
    pub fn on_change(mut self, callback: ChangeCallback) -> Self {
        self.on_change = Some(callback);
        self
    }
}

impl std::fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("persistent", &self.persistent)
            .field("on_change", &self.on_change.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

struct RawRead {
    section: String,
    key: String,
    value: String,
}

/// 类型化配置访问接口
#[derive(Debug, Clone)]
pub struct ConfigInterface {
    view: ConfigView,
    plugins: Arc<PluginRegistry>,
}

impl ConfigInterface {
    /// 基于视图创建访问接口
    pub fn new(view: ConfigView, plugins: Arc<PluginRegistry>) -> Self {
        Self { view, plugins }
    }

    /// 底层视图
    pub fn view(&self) -> &ConfigView {
        &self.view
    }

    /// 插件注册表
    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// 配置名称
    pub fn config_name(&self) -> String {
        self.view.config_name()
    }

    /// 限定到另一组节的访问接口
    pub fn change_view<I, S>(&self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            view: self.view.change_view(Some(sections)),
            plugins: self.plugins.clone(),
        }
    }

    /// 不限定节的访问接口
    pub fn unscoped(&self) -> Self {
        Self {
            view: self.view.unscoped(),
            plugins: self.plugins.clone(),
        }
    }

    fn read(&self, key: &str, default: Option<String>, options: &ReadOptions) -> ConfigResult<RawRead> {
        let key = normalize_key(key);
        let section = self.view.primary_section();
        // 先记录默认值，带操作符的条目在每次读取时都折叠到同一个基值上
        if let Some(default) = &default {
            self.view.record_default(&key, default);
        }
        let found = self.view.lookup(None, &key);

        let (raw, value, generation) = match found {
            Some(found) => (found.raw, found.value, Some(found.generation)),
            None => match default {
                Some(default) => {
                    let value = self.view.substitute(&default);
                    (default, value, None)
                }
                None => return Err(ConfigError::key_not_found(section, key)),
            },
        };

        if options.persistent {
            self.view.mark_persistent(&key);
            if generation == Some(Generation::Stored) {
                if let Err(e) = self.view.set(&key, &raw, EntryOp::Assign, EntrySource::Runtime) {
                    debug!("无法保存持久化配置 [{}] {}: {}", section, key, e);
                }
            }
        }
        if let Some(listener) = &options.on_change {
            self.register_change(&section, &key, listener.clone(), &raw);
        }
        self.view
            .changes()
            .observe(&section, &key, Some(raw.as_str()), &self.view.config_name());

        Ok(RawRead { section, key, value })
    }

    fn register_change(&self, section: &str, key: &str, listener: ChangeCallback, raw: &str) {
        let current = self.view.lookup_generation(Generation::Current, None, key);
        let stored = self.view.lookup_generation(Generation::Stored, None, key);
        self.view
            .changes()
            .register(section, key, listener.clone(), Some(raw.to_string()));
        if let (Some(current), Some(stored)) = (current, stored) {
            if current.raw != stored.raw {
                warn!(
                    "配置与上次运行不一致: [{}] {}: {} -> {}",
                    section, key, stored.raw, current.raw
                );
                let event = ConfigChangeEvent::drift(
                    section,
                    key,
                    stored.raw,
                    current.raw,
                    self.view.config_name(),
                );
                listener.on_config_changed(&event);
            }
        }
    }

    /// 读取类型化配置
    pub fn get_typed<T: ConfigValue>(&self, key: &str, default: Option<T>, options: &ReadOptions) -> ConfigResult<T> {
        let read = self.read(key, default.map(|d| d.to_raw()), options)?;
        T::parse_raw(&read.value).ok_or_else(|| {
            ConfigError::type_conversion(read.section, read.key, read.value, T::TYPE_NAME)
        })
    }

    /// 读取字符串配置
    pub fn get(&self, key: &str, default: Option<&str>) -> ConfigResult<String> {
        self.get_with(key, default, &ReadOptions::default())
    }

    /// 带读取选项读取字符串配置
    pub fn get_with(&self, key: &str, default: Option<&str>, options: &ReadOptions) -> ConfigResult<String> {
        self.read(key, default.map(str::to_string), options)
            .map(|read| read.value)
    }

    /// 读取整数配置
    pub fn get_int(&self, key: &str, default: Option<i64>) -> ConfigResult<i64> {
        self.get_typed(key, default, &ReadOptions::default())
    }

    /// 读取布尔配置
    pub fn get_bool(&self, key: &str, default: Option<bool>) -> ConfigResult<bool> {
        self.get_typed(key, default, &ReadOptions::default())
    }

    /// 读取浮点配置
    pub fn get_float(&self, key: &str, default: Option<f64>) -> ConfigResult<f64> {
        self.get_typed(key, default, &ReadOptions::default())
    }

    /// 读取 `hh[:mm[:ss]]` 格式的时间配置
    pub fn get_time(&self, key: &str, default: Option<Duration>) -> ConfigResult<Duration> {
        self.get_typed(key, default, &ReadOptions::default())
    }

    /// 读取以空白分隔的列表配置
    pub fn get_list(&self, key: &str, default: Option<&[&str]>) -> ConfigResult<Vec<String>> {
        let default = default.map(|items| items.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        self.get_typed(key, default, &ReadOptions::default())
    }

    /// 读取路径配置，相对路径按搜索路径解析
    pub fn get_path(&self, key: &str, default: Option<&str>, must_exist: bool) -> ConfigResult<PathBuf> {
        let read = self.read(key, default.map(str::to_string), &ReadOptions::default())?;
        resolve_path(&read.value, &self.view.search_paths(), must_exist)
    }

    /// 读取路径列表配置，支持通配符
    pub fn get_paths(&self, key: &str, default: Option<&[&str]>, must_exist: bool) -> ConfigResult<Vec<PathBuf>> {
        let default = default.map(|items| items.join("\n"));
        let read = self.read(key, default, &ReadOptions::default())?;
        let search_paths = self.view.search_paths();

        let mut result: Vec<PathBuf> = Vec::new();
        for item in read.value.split_whitespace() {
            let found = if item.contains(['*', '?', '[']) {
                expand_glob(item, &search_paths, must_exist)?
            } else {
                vec![resolve_path(item, &search_paths, must_exist)?]
            };
            for path in found {
                if !result.contains(&path) {
                    result.push(path);
                }
            }
        }
        Ok(result)
    }

    /// 读取插件配置并解析为插件句柄
    pub fn get_plugin(&self, key: &str, default: Option<&str>, kind: &str) -> ConfigResult<PluginHandle> {
        let name = self.get(key, default)?;
        self.plugins.resolve(kind, name.trim())
    }

    /// 在活动节中写入配置
    pub fn set(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.set_with(key, value, EntryOp::Assign)
    }

    /// 带操作符写入配置
    pub fn set_with(&self, key: &str, value: &str, op: EntryOp) -> ConfigResult<()> {
        debug!("设置配置 [{}] {} {} {}", self.view.primary_section(), key, op.symbol(), value);
        self.view.set(key, value, op, EntrySource::Runtime)
    }

    /// 写入整数配置
    pub fn set_int(&self, key: &str, value: i64) -> ConfigResult<()> {
        self.set_typed(key, &value)
    }

    /// 写入类型化配置
    pub fn set_typed<T: ConfigValue>(&self, key: &str, value: &T) -> ConfigResult<()> {
        self.set(key, &value.to_raw())
    }

    /// 工作目录下的路径
    pub fn work_path<I, S>(&self, parts: I) -> ConfigResult<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::path::Path>,
    {
        let work_dir = self
            .view
            .paths()
            .read()
            .token(WORKDIR_TOKEN)
            .map(|path| path.to_path_buf())
            .ok_or_else(|| ConfigError::key_not_found("global", "workdir"))?;
        Ok(parts
            .into_iter()
            .fold(work_dir, |acc, part| acc.join(part)))
    }

    /// 把活动节绑定到结构体
    ///
    /// 键中的空白替换为下划线；布尔和数值按字面转换。
    pub fn bind_section<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        let section = self.view.primary_section();
        let keys: Vec<String> = self
            .view
            .iter_content()
            .into_iter()
            .filter(|resolved| resolved.section == section)
            .map(|resolved| resolved.key)
            .collect();

        let mut object = serde_json::Map::new();
        for key in keys {
            if let Some(found) = self.view.lookup(None, &key) {
                object.insert(key.replace(' ', "_"), convert_scalar(&found.value));
            }
        }
        debug!("绑定配置节 [{}]，共 {} 个键", section, object.len());
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }
}

fn expand_glob(pattern: &str, search_paths: &[PathBuf], must_exist: bool) -> ConfigResult<Vec<PathBuf>> {
    let absolute = resolve_path(pattern, search_paths, false)?;
    let mut matches: Vec<PathBuf> = glob::glob(&absolute.to_string_lossy())
        .map_err(|e| ConfigError::PathNotFound {
            path: format!("{pattern}: {e}"),
            searched: search_paths.to_vec(),
        })?
        .filter_map(Result::ok)
        .collect();
    matches.sort();
    if matches.is_empty() && must_exist {
        return Err(ConfigError::PathNotFound {
            path: pattern.to_string(),
            searched: search_paths.to_vec(),
        });
    }
    Ok(matches)
}

fn convert_scalar(value: &str) -> serde_json::Value {
    let trimmed = value.trim();
    if let Ok(b) = trimmed.parse::<bool>() {
        serde_json::Value::Bool(b)
    } else if let Ok(n) = trimmed.parse::<i64>() {
        serde_json::Value::Number(n.into())
    } else if let Some(n) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        serde_json::Value::Number(n)
    } else {
        serde_json::Value::String(value.to_string())
    }
}
