//! 配置条目定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// 配置条目来源
///
/// 变体顺序即优先级：同一容器内，来源优先级高的条目覆盖低的。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// 调用方声明的默认值
    Default,
    /// 旧版兼容状态文件
    Compat,
    /// 配置文件
    File,
    /// 命令行等字典覆盖
    Dict,
    /// 运行期写入
    Runtime,
}

impl EntrySource {
    /// 优先级，数字越大越优先
    pub fn priority(self) -> u8 {
        self as u8
    }

    /// 来源名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Compat => "compat",
            Self::File => "file",
            Self::Dict => "dict",
            Self::Runtime => "runtime",
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 赋值操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryOp {
    /// `=` 直接赋值
    Assign,
    /// `+=` 追加为新行
    Append,
    /// `^=` 前置为新行
    Prepend,
    /// `-=` 删除匹配的行
    Remove,
    /// `?=` 仅在尚无值时设置
    SetDefault,
}

impl EntryOp {
    /// 操作符文本
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Append => "+=",
            Self::Prepend => "^=",
            Self::Remove => "-=",
            Self::SetDefault => "?=",
        }
    }

    /// 从操作符文本解析
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Self::Assign),
            "+=" => Some(Self::Append),
            "^=" => Some(Self::Prepend),
            "-=" => Some(Self::Remove),
            "?=" => Some(Self::SetDefault),
            _ => None,
        }
    }

    /// 将本操作应用到已有值上
    pub fn apply(self, previous: Option<&str>, value: &str) -> Option<String> {
        match (self, previous) {
            (Self::Assign, _) | (Self::SetDefault, None) => Some(value.to_string()),
            (Self::SetDefault, Some(prev)) => Some(prev.to_string()),
            (Self::Append, Some(prev)) if !prev.is_empty() => Some(format!("{prev}\n{value}")),
            (Self::Prepend, Some(prev)) if !prev.is_empty() => Some(format!("{value}\n{prev}")),
            (Self::Append | Self::Prepend, _) => Some(value.to_string()),
            (Self::Remove, None) => None,
            (Self::Remove, Some(prev)) => {
                let removed: Vec<&str> = value.lines().map(str::trim).collect();
                let kept: Vec<&str> = prev
                    .lines()
                    .filter(|line| !removed.contains(&line.trim()))
                    .collect();
                Some(kept.join("\n"))
            }
        }
    }
}

/// 规范化节名：去除首尾空白、小写、合并连续空白
pub fn normalize_section(section: &str) -> String {
    normalize_name(section)
}

/// 规范化键名
pub fn normalize_key(key: &str) -> String {
    normalize_name(key)
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 配置条目
///
/// 值在创建后不可变；`accessed` 是读取时记录的元数据，容器只读后依然可以设置。
#[derive(Debug)]
pub struct ConfigEntry {
    section: String,
    key: String,
    value: String,
    op: EntryOp,
    source: EntrySource,
    origin: String,
    accessed: AtomicBool,
    read_only: AtomicBool,
}

impl ConfigEntry {
    /// 创建新的配置条目
    pub fn new(
        section: &str,
        key: &str,
        value: impl Into<String>,
        op: EntryOp,
        source: EntrySource,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            section: normalize_section(section),
            key: normalize_key(key),
            value: value.into(),
            op,
            source,
            origin: origin.into(),
            accessed: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
        }
    }

    /// 创建直接赋值的条目
    pub fn assign(
        section: &str,
        key: &str,
        value: impl Into<String>,
        source: EntrySource,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(section, key, value, EntryOp::Assign, source, origin)
    }

    /// 以新值复制条目，保留其它元数据
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self.clone()
        }
    }

    /// 节名
    pub fn section(&self) -> &str {
        &self.section
    }

    /// 键名
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 原始值
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 赋值操作符
    pub fn op(&self) -> EntryOp {
        self.op
    }

    /// 来源
    pub fn source(&self) -> EntrySource {
        self.source
    }

    /// 来源位置描述，例如 `/path/task.conf:12`
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 是否已被读取
    pub fn is_accessed(&self) -> bool {
        self.accessed.load(Ordering::Relaxed)
    }

    /// 标记为已读取
    pub fn mark_accessed(&self) {
        self.accessed.store(true, Ordering::Relaxed);
    }

    /// 是否已随容器封存
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    /// 随容器封存
    pub fn seal(&self) {
        self.read_only.store(true, Ordering::Relaxed);
    }

    /// 格式化为配置文件行
    pub fn format(&self, print_section: bool) -> String {
        let value = self.value.replace('\n', "\n\t");
        if print_section {
            format!("[{}] {} {} {}", self.section, self.key, self.op.symbol(), value)
        } else {
            format!("{} {} {}", self.key, self.op.symbol(), value)
        }
    }

    /// 转换为可序列化的记录
    pub fn to_record(&self) -> EntryRecord {
        EntryRecord {
            section: self.section.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            op: self.op,
            source: self.source,
            origin: self.origin.clone(),
            accessed: self.is_accessed(),
        }
    }
}

impl Clone for ConfigEntry {
    fn clone(&self) -> Self {
        Self {
            section: self.section.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            op: self.op,
            source: self.source,
            origin: self.origin.clone(),
            accessed: AtomicBool::new(self.is_accessed()),
            read_only: AtomicBool::new(self.is_read_only()),
        }
    }
}

/// 配置条目的可序列化快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// 节名
    pub section: String,
    /// 键名
    pub key: String,
    /// 值
    pub value: String,
    /// 赋值操作符
    pub op: EntryOp,
    /// 来源
    pub source: EntrySource,
    /// 来源位置
    pub origin: String,
    /// 是否已被读取
    pub accessed: bool,
}
