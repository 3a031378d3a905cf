//! 插件注册表
//!
//! 插件可以在进程内任意位置声明，因此搜索路径是进程级资源。
//! 这里把它建模为显式对象：工厂持有注入的注册表，测试可以创建互相隔离的实例。

use crate::errors::{ConfigError, ConfigResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 插件来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginSource {
    /// 进程内注册的内置插件
    Builtin,
    /// 在搜索路径中找到的插件文件
    File(PathBuf),
}

/// 已解析的插件句柄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHandle {
    /// 插件类别
    pub kind: String,
    /// 插件名称
    pub name: String,
    /// 插件来源
    pub source: PluginSource,
}

#[derive(Debug, Default)]
struct RegistryState {
    search_paths: Vec<PathBuf>,
    builtins: BTreeMap<String, BTreeSet<String>>,
}

/// 插件注册表
///
/// 搜索路径只增不减，重复添加的路径会被忽略。
#[derive(Debug, Default)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    /// 创建空的插件注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加搜索路径，返回是否为新路径
    pub fn add_search_path(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let mut state = self.state.write();
        if state.search_paths.contains(&path) {
            return false;
        }
        debug!("添加插件搜索路径: {}", path.display());
        state.search_paths.push(path);
        true
    }

    /// 批量添加搜索路径，返回新增的数量
    pub fn extend_search_paths<I, P>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths
            .into_iter()
            .map(Into::into)
            .filter(|path: &PathBuf| self.add_search_path(path.clone()))
            .count()
    }

    /// 获取当前搜索路径
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.state.read().search_paths.clone()
    }

    /// 注册内置插件
    pub fn register_builtin(&self, kind: impl Into<String>, name: impl Into<String>) {
        let kind = kind.into();
        let name = name.into();
        debug!("注册内置插件: {} -> {}", kind, name);
        self.state.write().builtins.entry(kind).or_default().insert(name);
    }

    /// 获取某类别下的内置插件名称
    pub fn builtin_names(&self, kind: &str) -> Vec<String> {
        self.state
            .read()
            .builtins
            .get(kind)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 解析插件
    ///
    /// 内置插件优先，其次按顺序在搜索路径中查找同名文件（忽略扩展名）。
    pub fn resolve(&self, kind: &str, name: &str) -> ConfigResult<PluginHandle> {
        let state = self.state.read();
        if state
            .builtins
            .get(kind)
            .is_some_and(|names| names.contains(name))
        {
            return Ok(PluginHandle {
                kind: kind.to_string(),
                name: name.to_string(),
                source: PluginSource::Builtin,
            });
        }

        for dir in &state.search_paths {
            if let Some(path) = find_plugin_file(dir, name) {
                debug!("在 {} 找到插件 {}", path.display(), name);
                return Ok(PluginHandle {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    source: PluginSource::File(path),
                });
            }
        }

        Err(ConfigError::PluginNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        })
    }
}

fn find_plugin_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(name))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}
