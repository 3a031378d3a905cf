//! 配置容器实现
//!
//! 一个容器保存某一代配置（本次运行的 `current` 或上次运行保存的 `stored`）的全部条目。
//! 同一 (节, 键) 的多个条目按来源优先级和插入顺序折叠成最终值，原始条目保留用于溯源。

use crate::interpolation;
use config_abstractions::{
    normalize_key, normalize_section, ConfigEntry, EntryOp, EntryRecord, EntrySink, EntrySource,
};
use config_common::{ConfigError, ConfigResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

type EntryKey = (String, String);

/// 折叠后的配置项
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    /// 节名
    pub section: String,
    /// 键名
    pub key: String,
    /// 最终值
    pub value: String,
    /// 最后一个参与折叠的条目来源
    pub source: EntrySource,
    /// 最后一个参与折叠的条目位置
    pub origin: String,
    /// 参与折叠的原始条目，按优先级升序
    pub entries: Vec<Arc<ConfigEntry>>,
}

impl ResolvedEntry {
    /// 标记所有参与折叠的条目为已读取
    pub fn mark_accessed(&self) {
        for entry in &self.entries {
            entry.mark_accessed();
        }
    }

    /// 是否有条目被读取过
    pub fn is_accessed(&self) -> bool {
        self.entries.iter().any(|entry| entry.is_accessed())
    }

    /// 是否只由默认值构成
    pub fn is_default_only(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.source() == EntrySource::Default)
    }

    /// 转换为可序列化的记录
    pub fn to_record(&self) -> EntryRecord {
        EntryRecord {
            section: self.section.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            op: EntryOp::Assign,
            source: self.source,
            origin: self.origin.clone(),
            accessed: self.is_accessed(),
        }
    }

    /// 格式化为配置文件行
    pub fn format(&self, print_section: bool) -> String {
        let value = self.value.replace('\n', "\n\t");
        if print_section {
            format!("[{}] {} = {}", self.section, self.key, value)
        } else {
            format!("{} = {}", self.key, value)
        }
    }
}

/// 配置容器
#[derive(Debug)]
pub struct ConfigContainer {
    name: String,
    entries: Vec<Arc<ConfigEntry>>,
    index: HashMap<EntryKey, Vec<usize>>,
    order: Vec<EntryKey>,
    persistent: BTreeSet<EntryKey>,
    enabled: bool,
    read_only: bool,
}

impl ConfigContainer {
    /// 创建新的空容器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            order: Vec::new(),
            persistent: BTreeSet::new(),
            enabled: true,
            read_only: false,
        }
    }

    /// 容器名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 是否参与解析
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 设置是否参与解析
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// 是否已只读
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// 封存容器，进程生命周期内不可撤销
    pub fn set_read_only(&mut self) {
        if !self.read_only {
            info!("配置容器 {} 已设为只读，共 {} 个条目", self.name, self.entries.len());
        }
        self.read_only = true;
        for entry in &self.entries {
            entry.seal();
        }
    }

    /// 添加一条直接赋值的配置
    pub fn add(
        &mut self,
        section: &str,
        key: &str,
        value: impl Into<String>,
        source: EntrySource,
    ) -> ConfigResult<()> {
        let origin = format!("<{source}>");
        self.push(ConfigEntry::assign(section, key, value, source, origin))
    }

    fn push(&mut self, entry: ConfigEntry) -> ConfigResult<()> {
        if self.read_only {
            return Err(ConfigError::ContainerReadOnly {
                container: self.name.clone(),
                section: entry.section().to_string(),
                key: entry.key().to_string(),
            });
        }
        let key = (entry.section().to_string(), entry.key().to_string());
        let position = self.entries.len();
        match self.index.get_mut(&key) {
            Some(positions) => positions.push(position),
            None => {
                self.order.push(key.clone());
                self.index.insert(key, vec![position]);
            }
        }
        self.entries.push(Arc::new(entry));
        Ok(())
    }

    /// 全部原始条目，按插入顺序
    pub fn entries(&self) -> &[Arc<ConfigEntry>] {
        &self.entries
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 指定键的全部原始条目，按优先级升序
    pub fn entries_for(&self, section: &str, key: &str) -> Vec<Arc<ConfigEntry>> {
        let key = (normalize_section(section), normalize_key(key));
        self.sorted_entries(&key)
    }

    fn sorted_entries(&self, key: &EntryKey) -> Vec<Arc<ConfigEntry>> {
        let mut entries: Vec<Arc<ConfigEntry>> = self
            .index
            .get(key)
            .map(|positions| positions.iter().map(|&p| self.entries[p].clone()).collect())
            .unwrap_or_default();
        // 稳定排序：同一优先级保持插入顺序
        entries.sort_by_key(|entry| entry.source().priority());
        entries
    }

    /// 所有出现过的 (节, 键)，按首次出现顺序
    pub fn keys(&self) -> Vec<(String, String)> {
        self.order.clone()
    }

    /// 所有出现过的节，按首次出现顺序
    pub fn sections(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.order
            .iter()
            .filter(|(section, _)| seen.insert(section.clone()))
            .map(|(section, _)| section.clone())
            .collect()
    }

    /// 获取折叠后的配置项
    pub fn get(&self, section: &str, key: &str) -> Option<ResolvedEntry> {
        let key = (normalize_section(section), normalize_key(key));
        self.fold(&key, |_| true)
    }

    /// 获取折叠后的配置项，忽略仅由默认值构成的结果
    pub fn get_configured(&self, section: &str, key: &str) -> Option<ResolvedEntry> {
        self.get(section, key)
            .filter(|resolved| !resolved.is_default_only())
    }

    /// 声明的默认值，即仅由默认来源条目折叠出的值
    pub fn default_value(&self, section: &str, key: &str) -> Option<String> {
        let key = (normalize_section(section), normalize_key(key));
        self.fold(&key, |entry| entry.source() == EntrySource::Default)
            .map(|resolved| resolved.value)
    }

    fn fold(&self, key: &EntryKey, filter: impl Fn(&ConfigEntry) -> bool) -> Option<ResolvedEntry> {
        let entries: Vec<Arc<ConfigEntry>> = self
            .sorted_entries(key)
            .into_iter()
            .filter(|entry| filter(entry))
            .collect();
        let last = entries.last()?.clone();
        let mut value: Option<String> = None;
        for entry in &entries {
            value = entry.op().apply(value.as_deref(), entry.value());
        }
        Some(ResolvedEntry {
            section: key.0.clone(),
            key: key.1.clone(),
            value: value?,
            source: last.source(),
            origin: last.origin().to_string(),
            entries,
        })
    }

    /// 所有折叠后的配置项，按首次出现顺序
    pub fn iter_resolved(&self) -> Vec<ResolvedEntry> {
        self.order
            .iter()
            .filter_map(|key| self.fold(key, |_| true))
            .collect()
    }

    /// 标记为持久化：冻结时无论是否等于默认值都会写出
    pub fn mark_persistent(&mut self, section: &str, key: &str) {
        self.persistent
            .insert((normalize_section(section), normalize_key(key)));
    }

    /// 是否为持久化条目
    pub fn is_persistent(&self, section: &str, key: &str) -> bool {
        self.persistent
            .contains(&(normalize_section(section), normalize_key(key)))
    }

    /// 解析插值引用
    ///
    /// 重复调用与调用一次结果相同；已只读的容器中若仍有未解析的引用则报错。
    pub fn resolve(&mut self) -> ConfigResult<()> {
        let values: HashMap<EntryKey, String> = self
            .iter_resolved()
            .into_iter()
            .map(|resolved| ((resolved.section, resolved.key), resolved.value))
            .collect();

        let pending: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| interpolation::has_reference(entry.value()))
            .map(|(position, _)| position)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        if self.read_only {
            let entry = &self.entries[pending[0]];
            return Err(ConfigError::ContainerReadOnly {
                container: self.name.clone(),
                section: entry.section().to_string(),
                key: entry.key().to_string(),
            });
        }

        let mut resolver = interpolation::Resolver::new(&values);
        for position in pending {
            let entry = self.entries[position].clone();
            let value = resolver.interpolate(entry.section(), entry.key(), entry.value())?;
            debug!("插值 [{}] {}: {} -> {}", entry.section(), entry.key(), entry.value(), value);
            self.entries[position] = Arc::new(entry.with_value(value));
        }
        Ok(())
    }
}

impl EntrySink for ConfigContainer {
    fn add_entry(&mut self, entry: ConfigEntry) -> ConfigResult<()> {
        self.push(entry)
    }

    fn sink_name(&self) -> &str {
        &self.name
    }
}

/// 带操作符添加条目的便捷函数
pub fn add_with_op(
    container: &mut ConfigContainer,
    section: &str,
    key: &str,
    value: &str,
    op: EntryOp,
    source: EntrySource,
) -> ConfigResult<()> {
    let origin = format!("<{source}>");
    container.add_value(section, key, value, op, source, &origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_entry_overrides_within_same_source() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "retries", "3", EntrySource::File).unwrap();
        container.add("jobs", "retries", "4", EntrySource::File).unwrap();

        let resolved = container.get("jobs", "retries").unwrap();
        assert_eq!(resolved.value, "4");
        assert_eq!(container.entries_for("jobs", "retries").len(), 2);
    }

    #[test]
    fn test_override_source_wins_regardless_of_order() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "retries", "5", EntrySource::Dict).unwrap();
        container.add("jobs", "retries", "3", EntrySource::File).unwrap();

        let resolved = container.get("jobs", "retries").unwrap();
        assert_eq!(resolved.value, "5");
        assert_eq!(resolved.source, EntrySource::Dict);
    }

    #[test]
    fn test_operators_fold_in_precedence_order() {
        let mut container = ConfigContainer::new("current");
        container.add("global", "plugin paths", "/a", EntrySource::File).unwrap();
        add_with_op(&mut container, "global", "plugin paths", "/b", EntryOp::Append, EntrySource::Dict).unwrap();
        add_with_op(&mut container, "global", "plugin paths", "/z", EntryOp::SetDefault, EntrySource::Dict).unwrap();

        assert_eq!(container.get("global", "plugin paths").unwrap().value, "/a\n/b");
    }

    #[test]
    fn test_sealed_container_rejects_entries() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "retries", "3", EntrySource::File).unwrap();
        container.set_read_only();

        let err = container.add("jobs", "retries", "4", EntrySource::Runtime).unwrap_err();
        assert!(err.is_read_only());
        assert!(container.entries()[0].is_read_only());
        assert_eq!(container.get("jobs", "retries").unwrap().value, "3");
    }

    #[test]
    fn test_sealed_empty_container_rejects_entries() {
        let mut container = ConfigContainer::new("stored");
        container.set_read_only();
        assert!(container.add("a", "b", "c", EntrySource::File).unwrap_err().is_read_only());
    }

    #[test]
    fn test_accessed_flag_can_be_set_after_sealing() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "retries", "3", EntrySource::File).unwrap();
        container.set_read_only();

        let resolved = container.get("jobs", "retries").unwrap();
        resolved.mark_accessed();
        assert!(container.get("jobs", "retries").unwrap().is_accessed());
    }

    #[test]
    fn test_default_only_entries_are_not_configured() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "wall time", "24:00", EntrySource::Default).unwrap();
        assert!(container.get_configured("jobs", "wall time").is_none());

        container.add("jobs", "wall time", "72:00", EntrySource::File).unwrap();
        assert_eq!(container.get_configured("jobs", "wall time").unwrap().value, "72:00");
        assert_eq!(container.default_value("jobs", "wall time").as_deref(), Some("24:00"));
    }

    #[test]
    fn test_resolve_interpolation() {
        let mut container = ConfigContainer::new("current");
        container.add("global", "base", "/data", EntrySource::File).unwrap();
        container.add("jobs", "output", "%(global:base)s/out", EntrySource::File).unwrap();
        container.add("jobs", "log", "%(output)s/log", EntrySource::File).unwrap();
        container.add("jobs", "home", "%(base)s/home", EntrySource::File).unwrap();
        container.resolve().unwrap();

        assert_eq!(container.get("jobs", "output").unwrap().value, "/data/out");
        assert_eq!(container.get("jobs", "log").unwrap().value, "/data/out/log");
        assert_eq!(container.get("jobs", "home").unwrap().value, "/data/home");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut container = ConfigContainer::new("current");
        container.add("global", "base", "/data", EntrySource::File).unwrap();
        container.add("jobs", "output", "%(global:base)s/out", EntrySource::File).unwrap();
        container.resolve().unwrap();
        let first: Vec<String> = container.iter_resolved().into_iter().map(|r| r.value).collect();
        container.resolve().unwrap();
        let second: Vec<String> = container.iter_resolved().into_iter().map(|r| r.value).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_detects_cycles() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "a", "%(b)s", EntrySource::File).unwrap();
        container.add("jobs", "b", "%(a)s", EntrySource::File).unwrap();

        let err = container.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InterpolationCycle { .. }));
        // 结果是确定的
        let err_again = container.resolve().unwrap_err();
        assert_eq!(err.to_string(), err_again.to_string());
    }

    #[test]
    fn test_resolve_reports_missing_reference() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "a", "%(missing)s", EntrySource::File).unwrap();
        let err = container.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_sections_in_first_appearance_order() {
        let mut container = ConfigContainer::new("current");
        container.add("jobs", "a", "1", EntrySource::File).unwrap();
        container.add("global", "b", "2", EntrySource::File).unwrap();
        container.add("jobs", "c", "3", EntrySource::File).unwrap();
        assert_eq!(container.sections(), vec!["jobs", "global"]);
    }
}
