//! 配置值插值
//!
//! 引用语法为 `%(key)s`（同节，找不到时回退到 `global` 节）和 `%(section:key)s`。

use config_abstractions::{normalize_key, normalize_section};
use config_common::{ConfigError, ConfigResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// 引用允许的最大嵌套深度
pub const MAX_DEPTH: usize = 32;

const GLOBAL_SECTION: &str = "global";

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%\(([^()%]+)\)s").unwrap_or_else(|e| panic!("插值正则无效: {e}"))
});

type EntryKey = (String, String);

/// 值中是否包含引用
pub fn has_reference(value: &str) -> bool {
    REFERENCE.is_match(value)
}

/// 插值解析器，缓存已解析的目标值
pub(crate) struct Resolver<'a> {
    values: &'a HashMap<EntryKey, String>,
    resolved: HashMap<EntryKey, String>,
    stack: Vec<EntryKey>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(values: &'a HashMap<EntryKey, String>) -> Self {
        Self {
            values,
            resolved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// 解析某个条目值中的全部引用
    pub(crate) fn interpolate(&mut self, section: &str, key: &str, value: &str) -> ConfigResult<String> {
        let owner = (section.to_string(), key.to_string());
        self.stack.push(owner);
        let result = self.substitute(section, key, value);
        self.stack.pop();
        result
    }

    fn substitute(&mut self, section: &str, key: &str, value: &str) -> ConfigResult<String> {
        // 替换结果已完全解析，不再重新扫描
        let mut result = String::with_capacity(value.len());
        let mut last = 0;
        for found in REFERENCE.captures_iter(value) {
            let (Some(whole), Some(reference)) = (found.get(0), found.get(1)) else {
                continue;
            };
            let target = self.target(section, key, reference.as_str())?;
            let replacement = self.value_of(&target)?;
            result.push_str(&value[last..whole.start()]);
            result.push_str(&replacement);
            last = whole.end();
        }
        result.push_str(&value[last..]);
        Ok(result)
    }

    fn target(&self, section: &str, key: &str, reference: &str) -> ConfigResult<EntryKey> {
        let candidates = match reference.split_once(':') {
            Some((target_section, target_key)) => {
                vec![(normalize_section(target_section), normalize_key(target_key))]
            }
            None => {
                let target_key = normalize_key(reference);
                vec![
                    (section.to_string(), target_key.clone()),
                    (GLOBAL_SECTION.to_string(), target_key),
                ]
            }
        };
        candidates
            .into_iter()
            .find(|candidate| self.values.contains_key(candidate))
            .ok_or_else(|| ConfigError::UnresolvedReference {
                section: section.to_string(),
                key: key.to_string(),
                reference: reference.to_string(),
            })
    }

    fn value_of(&mut self, target: &EntryKey) -> ConfigResult<String> {
        if let Some(value) = self.resolved.get(target) {
            return Ok(value.clone());
        }
        if let Some(position) = self.stack.iter().position(|entry| entry == target) {
            let chain = self.stack[position..]
                .iter()
                .chain(std::iter::once(target))
                .map(|(section, key)| format!("[{section}] {key}"))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ConfigError::InterpolationCycle { chain });
        }
        if self.stack.len() >= MAX_DEPTH {
            let (section, key) = &self.stack[0];
            return Err(ConfigError::InterpolationTooDeep {
                section: section.clone(),
                key: key.clone(),
                limit: MAX_DEPTH,
            });
        }
        let raw = self.values.get(target).cloned().unwrap_or_default();
        let value = self.interpolate(&target.0, &target.1, &raw)?;
        self.resolved.insert(target.clone(), value.clone());
        Ok(value)
    }
}
