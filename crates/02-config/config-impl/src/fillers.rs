//! 配置填充器实现

use config_abstractions::{ConfigFiller, EntryOp, EntrySink, EntrySource};
use config_common::{ConfigError, ConfigResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 包含文件的最大嵌套层数
const MAX_INCLUDE_DEPTH: usize = 16;

const INCLUDE_KEY: &str = "include";

/// 内存字典填充器
///
/// 用于命令行覆盖等场景，来源为 [`EntrySource::Dict`]，优先于文件。
#[derive(Debug, Clone, Default)]
pub struct DictConfigFiller {
    entries: Vec<(String, String, String, EntryOp)>,
}

impl DictConfigFiller {
    /// 创建空的字典填充器
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 节 -> 键 -> 值 的嵌套映射创建
    pub fn from_map(map: &BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let entries = map
            .iter()
            .flat_map(|(section, values)| {
                values.iter().map(move |(key, value)| {
                    (section.clone(), key.clone(), value.clone(), EntryOp::Assign)
                })
            })
            .collect();
        Self { entries }
    }

    /// 从 `section.key=value` 形式的覆盖项创建
    ///
    /// 等号前可以带操作符，例如 `jobs.queues+=long`；省略节名时使用 `global`。
    pub fn from_overrides<I, S>(overrides: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filler = Self::new();
        for (index, item) in overrides.into_iter().enumerate() {
            let item = item.as_ref();
            let (target, op, value) = split_assignment(item).ok_or_else(|| ConfigError::ParseError {
                path: "<overrides>".to_string(),
                line: index + 1,
                message: format!("无效的覆盖项: {item}"),
            })?;
            let (section, key) = target.split_once('.').unwrap_or(("global", target));
            filler = filler.with_entry(section, key, value, op);
        }
        Ok(filler)
    }

    /// 添加一条配置
    pub fn with_entry(mut self, section: &str, key: &str, value: &str, op: EntryOp) -> Self {
        self.entries
            .push((section.to_string(), key.to_string(), value.to_string(), op));
        self
    }
}

impl ConfigFiller for DictConfigFiller {
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()> {
        debug!("写入 {} 条覆盖配置到 {}", self.entries.len(), sink.sink_name());
        for (section, key, value, op) in &self.entries {
            sink.add_value(section, key, value, *op, EntrySource::Dict, "<dict>")?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "DictConfigFiller"
    }
}

/// 配置文件填充器
///
/// 文件格式：`[section]` 节头，`key = value`（或 `+=` `^=` `-=` `?=`），
/// 以空白开头的行续接上一值，`;` 或 `#` 开头的行为注释。
/// `[global]` 节中的 `include` 列出的文件先于本文件载入。
#[derive(Debug, Clone)]
pub struct FileConfigFiller {
    paths: Vec<PathBuf>,
    source: EntrySource,
}

impl FileConfigFiller {
    /// 创建文件填充器
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            source: EntrySource::File,
        }
    }

    /// 文件列表
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn fill_file(&self, path: &Path, sink: &mut dyn EntrySink, depth: usize) -> ConfigResult<()> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ConfigError::ParseError {
                path: path.display().to_string(),
                line: 0,
                message: format!("包含文件嵌套超过 {MAX_INCLUDE_DEPTH} 层"),
            });
        }
        debug!("加载配置文件: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::FileReadError {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let parsed = parse_config(&content, &path.display().to_string())?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for entry in parsed.iter().filter(|entry| entry.is_include()) {
            for include in entry.value.split_whitespace() {
                self.fill_file(&base.join(include), sink, depth + 1)?;
            }
        }
        let mut count = 0;
        for entry in parsed.iter().filter(|entry| !entry.is_include()) {
            let origin = format!("{}:{}", path.display(), entry.line);
            sink.add_value(&entry.section, &entry.key, &entry.value, entry.op, self.source, &origin)?;
            count += 1;
        }
        debug!("配置文件 {} 加载完成，共 {} 个条目", path.display(), count);
        Ok(())
    }
}

impl ConfigFiller for FileConfigFiller {
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()> {
        for path in &self.paths {
            self.fill_file(path, sink, 0)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "FileConfigFiller"
    }
}

/// 默认配置文件填充器
///
/// 依次载入存在的 `/etc/gridconf.conf`、`~/.gridconf.conf` 和 `$GC_CONFIG`。
#[derive(Debug, Clone)]
pub struct DefaultFilesConfigFiller {
    inner: FileConfigFiller,
}

impl DefaultFilesConfigFiller {
    /// 环境变量名
    pub const ENV_VAR: &'static str = "GC_CONFIG";

    /// 创建默认配置文件填充器
    pub fn new() -> Self {
        let mut candidates = vec![PathBuf::from("/etc/gridconf.conf")];
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".gridconf.conf"));
        }
        if let Some(path) = std::env::var_os(Self::ENV_VAR) {
            candidates.push(PathBuf::from(path));
        }
        let existing: Vec<PathBuf> = candidates.into_iter().filter(|path| path.is_file()).collect();
        Self {
            inner: FileConfigFiller::new(existing),
        }
    }

    /// 将被载入的文件
    pub fn paths(&self) -> &[PathBuf] {
        self.inner.paths()
    }
}

impl Default for DefaultFilesConfigFiller {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigFiller for DefaultFilesConfigFiller {
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()> {
        self.inner.fill(sink)
    }

    fn name(&self) -> &str {
        "DefaultFilesConfigFiller"
    }
}

/// 兼容格式填充器
///
/// 读取旧版任务状态文件中 `key = value` 或 `key: value` 形式的行，写入 `task` 节。
/// 文件不存在时不做任何事。
#[derive(Debug, Clone)]
pub struct CompatConfigFiller {
    path: PathBuf,
    section: String,
}

impl CompatConfigFiller {
    /// 创建兼容格式填充器
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            section: "task".to_string(),
        }
    }
}

impl ConfigFiller for CompatConfigFiller {
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()> {
        if !self.path.is_file() {
            debug!("兼容格式文件不存在: {}", self.path.display());
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::FileReadError {
            path: self.path.clone(),
            source,
        })?;
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(['#', ';']) {
                continue;
            }
            let separator = match (line.find('='), line.find(':')) {
                (Some(eq), Some(colon)) => eq.min(colon),
                (Some(pos), None) | (None, Some(pos)) => pos,
                (None, None) => continue,
            };
            let key = line[..separator].trim();
            let value = line[separator + 1..].trim().trim_matches('"');
            if key.is_empty() {
                continue;
            }
            let origin = format!("{}:{}", self.path.display(), index + 1);
            sink.add_value(&self.section, key, value, EntryOp::Assign, EntrySource::Compat, &origin)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "CompatConfigFiller"
    }
}

/// 环境变量填充器
///
/// `GC_JOBS__RETRIES=3` 映射为 `[jobs] retries = 3`，来源为 [`EntrySource::Dict`]。
#[derive(Debug, Clone)]
pub struct EnvironmentConfigFiller {
    prefix: String,
    separator: String,
}

impl EnvironmentConfigFiller {
    /// 创建环境变量填充器
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: "__".to_string(),
        }
    }

    /// 设置节与键之间的分隔符
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    fn split_env_key<'a>(&self, env_key: &'a str) -> Option<(&'a str, &'a str)> {
        env_key
            .strip_prefix(self.prefix.as_str())?
            .split_once(self.separator.as_str())
            .filter(|(section, key)| !section.is_empty() && !key.is_empty())
    }

    fn fill_from<I>(&self, vars: I, sink: &mut dyn EntrySink) -> ConfigResult<usize>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut count = 0;
        for (name, value) in vars {
            if let Some((section, key)) = self.split_env_key(&name) {
                let origin = format!("${name}");
                sink.add_value(
                    &section.to_lowercase(),
                    &key.to_lowercase(),
                    &value,
                    EntryOp::Assign,
                    EntrySource::Dict,
                    &origin,
                )?;
                count += 1;
            }
        }
        Ok(count)
    }
}

impl ConfigFiller for EnvironmentConfigFiller {
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()> {
        debug!("加载环境变量，前缀: {}", self.prefix);
        let count = self.fill_from(std::env::vars(), sink)?;
        debug!("加载了 {} 个环境变量", count);
        Ok(())
    }

    fn name(&self) -> &str {
        "EnvironmentConfigFiller"
    }
}

/// 组合填充器，按顺序执行
#[derive(Default)]
pub struct MultiConfigFiller {
    fillers: Vec<Box<dyn ConfigFiller>>,
}

impl MultiConfigFiller {
    /// 创建空的组合填充器
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加填充器
    pub fn with(mut self, filler: impl ConfigFiller + 'static) -> Self {
        self.fillers.push(Box::new(filler));
        self
    }

    /// 追加已装箱的填充器
    pub fn push(&mut self, filler: Box<dyn ConfigFiller>) {
        self.fillers.push(filler);
    }

    /// 填充器数量
    pub fn len(&self) -> usize {
        self.fillers.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.fillers.is_empty()
    }
}

impl ConfigFiller for MultiConfigFiller {
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()> {
        for filler in &self.fillers {
            info!("应用配置填充器: {}", filler.name());
            filler.fill(sink)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MultiConfigFiller"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedEntry {
    section: String,
    key: String,
    value: String,
    op: EntryOp,
    line: usize,
}

impl ParsedEntry {
    fn is_include(&self) -> bool {
        self.section == "global" && self.key == INCLUDE_KEY
    }
}

fn split_assignment(line: &str) -> Option<(&str, EntryOp, &str)> {
    let eq = line.find('=')?;
    let (target, op) = match line[..eq].chars().last() {
        Some(c @ ('+' | '-' | '^' | '?')) => {
            let op = EntryOp::from_symbol(&format!("{c}="))?;
            (&line[..eq - 1], op)
        }
        _ => (&line[..eq], EntryOp::Assign),
    };
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    Some((target, op, line[eq + 1..].trim()))
}

fn parse_config(content: &str, path: &str) -> ConfigResult<Vec<ParsedEntry>> {
    let parse_error = |line: usize, message: String| ConfigError::ParseError {
        path: path.to_string(),
        line,
        message,
    };

    let mut entries: Vec<ParsedEntry> = Vec::new();
    let mut section: Option<String> = None;
    let mut pending: Option<ParsedEntry> = None;
    let mut blank_lines = 0;

    for (index, raw_line) in content.trim_start_matches('\u{feff}').lines().enumerate() {
        let number = index + 1;
        let trimmed = raw_line.trim();
        let indented = raw_line.starts_with([' ', '\t']);

        // 缩进行先按续行处理，值中以 `#`、`;` 开头的行和空行都属于值本身
        if let Some(entry) = pending.as_mut().filter(|_| indented) {
            if trimmed.is_empty() {
                blank_lines += 1;
                continue;
            }
            if !entry.value.is_empty() {
                entry.value.push('\n');
            }
            entry.value.push_str(&"\n".repeat(blank_lines));
            entry.value.push_str(trimmed);
            blank_lines = 0;
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with([';', '#']) {
            continue;
        }
        if indented {
            return Err(parse_error(number, format!("续行没有对应的配置项: {trimmed}")));
        }

        // 值末尾的空行不保留
        blank_lines = 0;
        entries.extend(pending.take());
        if let Some(name) = trimmed.strip_prefix('[') {
            let name = name
                .strip_suffix(']')
                .ok_or_else(|| parse_error(number, format!("无效的节头: {trimmed}")))?;
            section = Some(name.trim().to_string());
            continue;
        }

        let (key, op, value) = split_assignment(trimmed)
            .ok_or_else(|| parse_error(number, format!("无效的配置行: {trimmed}")))?;
        let section = section
            .clone()
            .ok_or_else(|| parse_error(number, format!("配置项不在任何节中: {key}")))?;
        pending = Some(ParsedEntry {
            section: config_abstractions::normalize_section(&section),
            key: config_abstractions::normalize_key(key),
            value: value.to_string(),
            op,
            line: number,
        });
    }
    entries.extend(pending);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ConfigContainer;

    #[test]
    fn test_parse_config_file() {
        let content = "; comment\n[global]\nworkdir = /tmp/run\n\n[jobs]\nwall time = 72:00\nqueues = short\n\tlong\nqueues += extra\n";
        let entries = parse_config(content, "task.conf").unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].key, "wall time");
        assert_eq!(entries[2].value, "short\nlong");
        assert_eq!(entries[3].op, EntryOp::Append);
        assert_eq!(entries[3].line, 9);
    }

    #[test]
    fn test_continuation_keeps_comment_like_and_blank_lines() {
        let content = "[jobs]\nscript = echo start\n\t# keep this line\n\t; and this\n\t\n\tdone\n\t\n# real comment\nretries = 3\n";
        let entries = parse_config(content, "work.conf").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, "echo start\n# keep this line\n; and this\n\ndone");
        assert_eq!(entries[1].key, "retries");
    }

    #[test]
    fn test_indented_comment_outside_entry_is_skipped() {
        let entries = parse_config("[jobs]\n\t# note\nretries = 3\n", "task.conf").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(parse_config("[jobs]\n\tstray\n", "task.conf").is_err());
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_config("[global]\nnot a valid line\n", "bad.conf").unwrap_err();
        match err {
            ConfigError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_config("key = value\n", "bad.conf").is_err());
    }

    #[test]
    fn test_file_filler_with_include() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.conf"), "[jobs]\nretries = 1\nqueue = short\n").unwrap();
        std::fs::write(
            dir.path().join("task.conf"),
            "[global]\ninclude = base.conf\n[jobs]\nretries = 3\n",
        )
        .unwrap();

        let mut container = ConfigContainer::new("current");
        FileConfigFiller::new([dir.path().join("task.conf")])
            .fill(&mut container)
            .unwrap();
        assert_eq!(container.get("jobs", "retries").unwrap().value, "3");
        assert_eq!(container.get("jobs", "queue").unwrap().value, "short");
        assert!(container.get("global", "include").is_none());
    }

    #[test]
    fn test_missing_file_fails() {
        let mut container = ConfigContainer::new("current");
        let err = FileConfigFiller::new(["/nonexistent/task.conf"])
            .fill(&mut container)
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_overrides_beat_file_entries() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("task.conf");
        std::fs::write(&file, "[jobs]\nretries = 3\n").unwrap();

        let mut container = ConfigContainer::new("current");
        DictConfigFiller::from_overrides(["jobs.retries=5"])
            .unwrap()
            .fill(&mut container)
            .unwrap();
        FileConfigFiller::new([file]).fill(&mut container).unwrap();

        let resolved = container.get("jobs", "retries").unwrap();
        assert_eq!(resolved.value, "5");
        assert_eq!(resolved.source, EntrySource::Dict);
    }

    #[test]
    fn test_override_syntax() {
        let filler = DictConfigFiller::from_overrides(["queues+=long", "jobs.wall time=1:00"]).unwrap();
        assert_eq!(filler.entries[0].0, "global");
        assert_eq!(filler.entries[0].3, EntryOp::Append);
        assert_eq!(filler.entries[1].1, "wall time");
        assert!(DictConfigFiller::from_overrides(["novalue"]).is_err());
    }

    #[test]
    fn test_compat_filler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.dat");
        std::fs::write(&path, "task id: GC123\nversion = \"2\"\n# ignored\n").unwrap();

        let mut container = ConfigContainer::new("stored");
        CompatConfigFiller::new(&path).fill(&mut container).unwrap();
        assert_eq!(container.get("task", "task id").unwrap().value, "GC123");
        assert_eq!(container.get("task", "version").unwrap().source, EntrySource::Compat);

        let mut empty = ConfigContainer::new("stored");
        CompatConfigFiller::new(dir.path().join("missing.dat"))
            .fill(&mut empty)
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_environment_filler() {
        let filler = EnvironmentConfigFiller::new("GC_");
        let mut container = ConfigContainer::new("current");
        let count = filler
            .fill_from(
                vec![
                    ("GC_JOBS__RETRIES".to_string(), "4".to_string()),
                    ("GC_IGNORED".to_string(), "x".to_string()),
                    ("PATH".to_string(), "/bin".to_string()),
                ],
                &mut container,
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(container.get("jobs", "retries").unwrap().value, "4");
    }

    #[test]
    fn test_multi_filler_runs_in_order() {
        let filler = MultiConfigFiller::new()
            .with(DictConfigFiller::new().with_entry("jobs", "retries", "1", EntryOp::Assign))
            .with(DictConfigFiller::new().with_entry("jobs", "retries", "2", EntryOp::Assign));
        let mut container = ConfigContainer::new("current");
        filler.fill(&mut container).unwrap();
        assert_eq!(filler.len(), 2);
        assert_eq!(container.get("jobs", "retries").unwrap().value, "2");
    }
}
