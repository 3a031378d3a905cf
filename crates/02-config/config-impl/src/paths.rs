//! 路径字典与路径解析

use config_common::{ConfigError, ConfigResult};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// 工作目录占位符
pub const WORKDIR_TOKEN: &str = "<WORKDIR>";

/// 路径字典
///
/// 保存路径占位符与搜索路径，读取配置值时把占位符替换为实际路径。
/// 引导完成后封存，之后不可再修改。
#[derive(Debug, Clone, Default)]
pub struct PathDictionary {
    tokens: BTreeMap<String, PathBuf>,
    search_paths: Vec<PathBuf>,
    sealed: bool,
}

impl PathDictionary {
    /// 创建空的路径字典
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置占位符
    pub fn set_token(&mut self, token: &str, path: impl Into<PathBuf>) -> ConfigResult<()> {
        if self.sealed {
            return Err(ConfigError::PathDictionarySealed {
                token: token.to_string(),
            });
        }
        let path = path.into();
        debug!("设置路径占位符 {} = {}", token, path.display());
        self.tokens.insert(token.to_string(), path);
        Ok(())
    }

    /// 获取占位符对应的路径
    pub fn token(&self, token: &str) -> Option<&Path> {
        self.tokens.get(token).map(PathBuf::as_path)
    }

    /// 添加搜索路径，返回是否为新路径
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) -> ConfigResult<bool> {
        let path = path.into();
        if self.sealed {
            return Err(ConfigError::PathDictionarySealed {
                token: path.display().to_string(),
            });
        }
        if self.search_paths.contains(&path) {
            return Ok(false);
        }
        self.search_paths.push(path);
        Ok(true)
    }

    /// 搜索路径，按添加顺序
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// 封存字典
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// 是否已封存
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// 替换值中的占位符
    pub fn substitute(&self, value: &str) -> String {
        self.tokens
            .iter()
            .fold(value.to_string(), |acc, (token, path)| {
                if acc.contains(token.as_str()) {
                    acc.replace(token.as_str(), &path.display().to_string())
                } else {
                    acc
                }
            })
    }
}

/// 解析路径
///
/// 绝对路径直接使用；相对路径依次在搜索路径中查找。
/// `must_exist` 为假且找不到时，返回以第一个搜索路径为基准的路径。
pub fn resolve_path(path: &str, search_paths: &[PathBuf], must_exist: bool) -> ConfigResult<PathBuf> {
    let expanded = expand_home(path.trim());
    if expanded.is_absolute() {
        let normalized = normalize(&expanded);
        if must_exist && !normalized.exists() {
            return Err(ConfigError::PathNotFound {
                path: path.to_string(),
                searched: Vec::new(),
            });
        }
        return Ok(normalized);
    }

    if let Some(found) = search_paths
        .iter()
        .map(|base| normalize(&base.join(&expanded)))
        .find(|candidate| candidate.exists())
    {
        return Ok(found);
    }
    if must_exist {
        return Err(ConfigError::PathNotFound {
            path: path.to_string(),
            searched: search_paths.to_vec(),
        });
    }
    Ok(match search_paths.first() {
        Some(base) => normalize(&base.join(&expanded)),
        None => normalize(&expanded),
    })
}

/// 确保目录存在
pub fn ensure_dir_exists(path: &Path, description: &str) -> ConfigResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    debug!("创建{}: {}", description, path.display());
    std::fs::create_dir_all(path).map_err(|source| ConfigError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        description: description.to_string(),
        source,
    })
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}

/// 按词法规范化路径，不访问文件系统
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}
