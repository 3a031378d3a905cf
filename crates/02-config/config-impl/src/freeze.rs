//! 冻结与漂移检测

use crate::container::ResolvedEntry;
use crate::view::ConfigView;
use config_abstractions::{EntryRecord, EntrySource};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 节排除策略
///
/// 名称带有标记字符的节保存内部状态，不参与未使用检查和漂移检测。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionExclusion {
    /// 标记字符
    pub marker: char,
    /// 为真时，节名中任一以标记开头的部分都会排除整个节（如 `dataset !private`）；
    /// 为假时只看节名本身是否以标记开头
    pub inherit: bool,
}

impl Default for SectionExclusion {
    fn default() -> Self {
        Self {
            marker: '!',
            inherit: true,
        }
    }
}

impl SectionExclusion {
    /// 节是否被排除
    pub fn is_excluded(&self, section: &str) -> bool {
        if self.inherit {
            section
                .split_whitespace()
                .any(|part| part.starts_with(self.marker))
        } else {
            section.starts_with(self.marker)
        }
    }
}

/// 冻结结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreezeReport {
    /// 未被读取的配置项
    pub unused: Vec<EntryRecord>,
    /// 写出的快照文件
    pub written: Vec<PathBuf>,
}

impl FreezeReport {
    /// 是否写出了快照
    pub fn wrote_snapshots(&self) -> bool {
        !self.written.is_empty()
    }
}

/// 本次运行与上次运行不一致的配置项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDrift {
    /// 节名
    pub section: String,
    /// 键名
    pub key: String,
    /// 上次运行的值
    pub stored: Option<String>,
    /// 本次运行的值
    pub current: String,
}

/// 未被读取的配置项，跳过被排除的节
pub fn unused_entries(view: &ConfigView, exclusion: &SectionExclusion) -> Vec<ResolvedEntry> {
    view.iter_content()
        .into_iter()
        .filter(|resolved| !exclusion.is_excluded(&resolved.section))
        .filter(|resolved| !resolved.is_accessed())
        .collect()
}

/// 比较本次运行与上次运行的配置
///
/// 上次运行的配置未启用时返回空列表。仅由默认值构成且上次运行没有记录的键不算漂移。
pub fn compute_drift(view: &ConfigView, exclusion: &SectionExclusion) -> Vec<ConfigDrift> {
    let stored = view.stored().read();
    if !stored.is_enabled() {
        return Vec::new();
    }
    view.iter_content()
        .into_iter()
        .filter(|resolved| !exclusion.is_excluded(&resolved.section))
        .filter_map(|resolved| {
            let previous = stored.get(&resolved.section, &resolved.key).map(|entry| entry.value);
            let default_only = resolved
                .entries
                .iter()
                .all(|entry| entry.source() == EntrySource::Default);
            match previous {
                Some(value) if value == resolved.value => None,
                None if default_only => None,
                previous => Some(ConfigDrift {
                    section: resolved.section,
                    key: resolved.key,
                    stored: previous,
                    current: resolved.value,
                }),
            }
        })
        .collect()
}
