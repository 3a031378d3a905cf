//! 配置视图
//!
//! 视图组合本次运行与上次运行的两个容器、一个路径字典和一组活动节。
//! 查找顺序：请求的节（或视图的活动节），它们的父节，然后是 `global` 节；
//! 每一层先查本次运行的容器，再查已启用的上次运行容器。

use crate::changes::ChangeRegistry;
use crate::container::{ConfigContainer, ResolvedEntry};
use crate::paths::PathDictionary;
use config_abstractions::{normalize_key, normalize_section, ConfigEntry, EntryOp, EntrySink, EntrySource};
use config_common::ConfigResult;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{trace, warn};

/// 默认的回退节
pub const GLOBAL_SECTION: &str = "global";

/// 查找结果所在的容器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// 本次运行
    Current,
    /// 上次运行保存的配置
    Stored,
}

/// 查找结果
#[derive(Debug, Clone)]
pub struct LookupResult {
    /// 命中的节
    pub section: String,
    /// 键名
    pub key: String,
    /// 未替换路径占位符的原始值
    pub raw: String,
    /// 替换路径占位符后的值
    pub value: String,
    /// 命中的容器
    pub generation: Generation,
    /// 条目来源
    pub source: EntrySource,
    /// 条目位置
    pub origin: String,
}

/// 配置视图
///
/// 克隆或 [`ConfigView::change_view`] 得到的视图与原视图共享容器。
#[derive(Debug, Clone)]
pub struct ConfigView {
    name: Arc<RwLock<String>>,
    current: Arc<RwLock<ConfigContainer>>,
    stored: Arc<RwLock<ConfigContainer>>,
    paths: Arc<RwLock<PathDictionary>>,
    changes: Arc<ChangeRegistry>,
    sections: Option<Vec<String>>,
    fallback: Vec<String>,
}

impl ConfigView {
    /// 创建新的视图
    pub fn new(
        name: impl Into<String>,
        current: Arc<RwLock<ConfigContainer>>,
        stored: Arc<RwLock<ConfigContainer>>,
    ) -> Self {
        Self {
            name: Arc::new(RwLock::new(name.into())),
            current,
            stored,
            paths: Arc::new(RwLock::new(PathDictionary::new())),
            changes: Arc::new(ChangeRegistry::new()),
            sections: None,
            fallback: vec![GLOBAL_SECTION.to_string()],
        }
    }

    /// 创建限定到另一组节的视图，原视图不受影响
    ///
    /// `None` 表示不限定节。
    pub fn change_view<I, S>(&self, sections: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sections: sections.map(|sections| {
                sections
                    .into_iter()
                    .map(|section| normalize_section(section.as_ref()))
                    .collect()
            }),
            ..self.clone()
        }
    }

    /// 创建不限定节的视图
    pub fn unscoped(&self) -> Self {
        Self {
            sections: None,
            ..self.clone()
        }
    }

    /// 活动节
    pub fn sections(&self) -> Option<&[String]> {
        self.sections.as_deref()
    }

    /// 写入和记录默认值时使用的节
    pub fn primary_section(&self) -> String {
        self.sections
            .as_ref()
            .and_then(|sections| sections.first().cloned())
            .unwrap_or_else(|| GLOBAL_SECTION.to_string())
    }

    /// 配置名称
    pub fn config_name(&self) -> String {
        self.name.read().clone()
    }

    /// 设置配置名称，所有共享此视图的句柄都可见
    pub fn set_config_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    /// 本次运行的容器
    pub fn current(&self) -> &Arc<RwLock<ConfigContainer>> {
        &self.current
    }

    /// 上次运行的容器
    pub fn stored(&self) -> &Arc<RwLock<ConfigContainer>> {
        &self.stored
    }

    /// 路径字典
    pub fn paths(&self) -> &Arc<RwLock<PathDictionary>> {
        &self.paths
    }

    /// 变更回调注册表
    pub fn changes(&self) -> &ChangeRegistry {
        &self.changes
    }

    /// 当前的搜索路径
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.paths.read().search_paths().to_vec()
    }

    /// 替换路径占位符
    pub fn substitute(&self, value: &str) -> String {
        self.paths.read().substitute(value)
    }

    /// 查找链
    pub fn section_chain(&self, section: Option<&str>) -> Vec<String> {
        let requested: Vec<String> = match section {
            Some(section) => vec![normalize_section(section)],
            None => self.sections.clone().unwrap_or_default(),
        };
        let parents = requested.iter().filter_map(|section| {
            section
                .split_once(' ')
                .map(|(parent, _)| parent.to_string())
        });
        let mut chain: Vec<String> = Vec::new();
        for candidate in requested
            .iter()
            .cloned()
            .chain(parents.collect::<Vec<_>>())
            .chain(self.fallback.iter().cloned())
        {
            if !chain.contains(&candidate) {
                chain.push(candidate);
            }
        }
        chain
    }

    /// 查找配置并标记为已读取
    ///
    /// 仅由默认值构成的条目不算命中，调用方的默认值只在整条查找链都未命中时使用。
    pub fn lookup(&self, section: Option<&str>, key: &str) -> Option<LookupResult> {
        let key = normalize_key(key);
        let chain = self.section_chain(section);
        self.lookup_in(Generation::Current, &chain, &key)
            .or_else(|| self.lookup_in(Generation::Stored, &chain, &key))
    }

    /// 只在指定容器中查找
    pub fn lookup_generation(&self, generation: Generation, section: Option<&str>, key: &str) -> Option<LookupResult> {
        let key = normalize_key(key);
        let chain = self.section_chain(section);
        self.lookup_in(generation, &chain, &key)
    }

    fn lookup_in(&self, generation: Generation, chain: &[String], key: &str) -> Option<LookupResult> {
        let container = match generation {
            Generation::Current => self.current.read(),
            Generation::Stored => self.stored.read(),
        };
        if !container.is_enabled() {
            return None;
        }
        let resolved = chain
            .iter()
            .find_map(|section| container.get_configured(section, key))?;
        drop(container);

        resolved.mark_accessed();
        trace!("配置命中 [{}] {} ({:?})", resolved.section, resolved.key, generation);
        Some(self.to_lookup(resolved, generation))
    }

    fn to_lookup(&self, resolved: ResolvedEntry, generation: Generation) -> LookupResult {
        LookupResult {
            value: self.substitute(&resolved.value),
            section: resolved.section,
            key: resolved.key,
            raw: resolved.value,
            generation,
            source: resolved.source,
            origin: resolved.origin,
        }
    }

    /// 在活动节中记录调用方声明的默认值
    ///
    /// 容器已只读时不记录，返回是否记录成功。
    pub fn record_default(&self, key: &str, default: &str) -> bool {
        let section = self.primary_section();
        let mut current = self.current.write();
        if current.is_read_only() {
            warn!("配置 {} 已冻结，无法记录默认值 [{}] {} = {}", current.name(), section, key, default);
            return false;
        }
        if current.default_value(&section, key).as_deref() == Some(default) {
            return true;
        }
        let entry = ConfigEntry::new(
            &section,
            key,
            default,
            EntryOp::SetDefault,
            EntrySource::Default,
            "<default>",
        );
        entry.mark_accessed();
        current.add_entry(entry).is_ok()
    }

    /// 在活动节中写入运行期配置
    pub fn set(&self, key: &str, value: &str, op: EntryOp, source: EntrySource) -> ConfigResult<()> {
        let section = self.primary_section();
        let origin = format!("<{source}>");
        self.current
            .write()
            .add_value(&section, key, value, op, source, &origin)
    }

    /// 标记活动节中的键为持久化
    pub fn mark_persistent(&self, key: &str) {
        let section = self.primary_section();
        self.current.write().mark_persistent(&section, key);
    }

    /// 视图可见的本次运行配置项，不限定节时返回全部
    pub fn iter_content(&self) -> Vec<ResolvedEntry> {
        let current = self.current.read();
        current
            .iter_resolved()
            .into_iter()
            .filter(|resolved| match &self.sections {
                Some(sections) => sections.contains(&resolved.section),
                None => true,
            })
            .collect()
    }
}
