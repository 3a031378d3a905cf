//! 配置快照写入

use crate::container::ResolvedEntry;
use crate::paths::WORKDIR_TOKEN;
use crate::view::{ConfigView, GLOBAL_SECTION};
use config_common::{ConfigError, ConfigResult};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// 完整快照文件头
pub const WORK_CONF_BANNER: &str =
    "; ==> DO NOT EDIT THIS FILE! <==\n; This file is used to find config changes!\n";

/// 快照写入选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// 写出等于默认值的条目
    pub print_default: bool,
    /// 写出未被读取的条目
    pub print_unused: bool,
    /// 每个键只写最终值；为假时写出全部原始条目及其操作符
    pub print_minimal: bool,
    /// 以注释写出条目来源
    pub print_source: bool,
    /// 在 `[global]` 节写出工作目录
    pub print_workdir: bool,
    /// 文件头
    pub header: Option<String>,
}

impl WriteOptions {
    /// 最小快照：只含被读取且不同于默认值（或持久化）的条目
    pub fn minimal() -> Self {
        Self {
            print_minimal: true,
            print_workdir: true,
            ..Self::default()
        }
    }

    /// 完整快照：全部条目，附来源和默认值注释
    pub fn complete() -> Self {
        Self {
            print_default: true,
            print_unused: true,
            print_minimal: true,
            print_source: true,
            print_workdir: false,
            header: Some(WORK_CONF_BANNER.to_string()),
        }
    }

    /// 全部原始条目，用于排查覆盖关系
    pub fn history() -> Self {
        Self {
            print_minimal: false,
            header: None,
            ..Self::complete()
        }
    }
}

/// 待写出的配置项
#[derive(Debug, Clone)]
pub struct SnapshotItem {
    /// 折叠后的配置项
    pub resolved: ResolvedEntry,
    /// 声明的默认值
    pub default: Option<String>,
    /// 是否持久化
    pub persistent: bool,
}

/// 按写入选项挑选视图中的配置项
pub fn select_entries(view: &ConfigView, options: &WriteOptions) -> Vec<SnapshotItem> {
    let sections = view.sections();
    let current = view.current().read();
    current
        .iter_resolved()
        .into_iter()
        .filter(|resolved| sections.map_or(true, |sections| sections.contains(&resolved.section)))
        .filter_map(|resolved| {
            let default = current.default_value(&resolved.section, &resolved.key);
            let persistent = current.is_persistent(&resolved.section, &resolved.key);
            if !options.print_unused && !resolved.is_accessed() {
                return None;
            }
            if !options.print_default && !persistent && default.as_deref() == Some(resolved.value.as_str()) {
                return None;
            }
            Some(SnapshotItem {
                resolved,
                default,
                persistent,
            })
        })
        .collect()
}

/// 写出视图内容
pub fn write_view(view: &ConfigView, out: &mut dyn Write, options: &WriteOptions) -> std::io::Result<()> {
    let items = select_entries(view, options);

    let mut sections: Vec<(String, Vec<&SnapshotItem>)> = Vec::new();
    for item in &items {
        match sections
            .iter_mut()
            .find(|(section, _)| *section == item.resolved.section)
        {
            Some((_, group)) => group.push(item),
            None => sections.push((item.resolved.section.clone(), vec![item])),
        }
    }

    let workdir_line = options
        .print_workdir
        .then(|| view.paths().read().token(WORKDIR_TOKEN).map(Path::to_path_buf))
        .flatten()
        .filter(|_| {
            !items
                .iter()
                .any(|item| item.resolved.section == GLOBAL_SECTION && item.resolved.key == "workdir")
        })
        .map(|path| format!("workdir = {}", path.display()));
    if workdir_line.is_some() && !sections.iter().any(|(section, _)| section == GLOBAL_SECTION) {
        sections.insert(0, (GLOBAL_SECTION.to_string(), Vec::new()));
    }

    if let Some(header) = &options.header {
        write!(out, "{header}")?;
    }
    for (index, (section, group)) in sections.iter().enumerate() {
        if index > 0 {
            writeln!(out)?;
        }
        writeln!(out, "[{section}]")?;
        if section == GLOBAL_SECTION {
            if let Some(line) = &workdir_line {
                writeln!(out, "{line}")?;
            }
        }
        for item in group {
            write_item(out, item, options)?;
        }
    }
    Ok(())
}

fn write_item(out: &mut dyn Write, item: &SnapshotItem, options: &WriteOptions) -> std::io::Result<()> {
    let resolved = &item.resolved;
    if !options.print_minimal {
        for entry in &resolved.entries {
            if options.print_source {
                writeln!(out, "; source: {} ({})", entry.source(), entry.origin())?;
            }
            writeln!(
                out,
                "{} {} {}",
                entry.key(),
                entry.op().symbol(),
                entry.value().replace('\n', "\n\t")
            )?;
        }
        return Ok(());
    }

    if options.print_source {
        writeln!(out, "; source: {} ({})", resolved.source, resolved.origin)?;
    }
    if options.print_default {
        if let Some(default) = item.default.as_ref().filter(|d| **d != resolved.value) {
            writeln!(out, "; default: {}", default.replace('\n', " "))?;
        }
    }
    writeln!(out, "{}", resolved.format(false))
}

/// 原子地写出快照文件
///
/// 先写入同目录的临时文件再重命名，写入失败不会留下半个文件。
pub fn write_file(view: &ConfigView, path: &Path, options: &WriteOptions) -> ConfigResult<()> {
    let write_error = |source: std::io::Error| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    let mut buffer = Vec::new();
    write_view(view, &mut buffer, options).map_err(write_error)?;

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    file.write_all(&buffer).map_err(write_error)?;
    file.flush().map_err(write_error)?;
    file.persist(path).map_err(|e| write_error(e.error))?;
    debug!("写出配置快照: {} ({} 字节)", path.display(), buffer.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ConfigContainer;
    use config_abstractions::EntrySource;
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn view() -> ConfigView {
        let mut current = ConfigContainer::new("current");
        current.add("jobs", "wall time", "24:00", EntrySource::Default).unwrap();
        current.add("jobs", "wall time", "72:00", EntrySource::File).unwrap();
        current.add("jobs", "retries", "3", EntrySource::Default).unwrap();
        current.add("jobs", "unused", "x", EntrySource::File).unwrap();
        current.add("jobs", "notes", "first\nsecond", EntrySource::File).unwrap();
        let view = ConfigView::new(
            "test",
            Arc::new(RwLock::new(current)),
            Arc::new(RwLock::new(ConfigContainer::new("stored"))),
        );
        for key in ["wall time", "retries", "notes"] {
            view.current().read().get("jobs", key).unwrap().mark_accessed();
        }
        view
    }

    fn render(view: &ConfigView, options: &WriteOptions) -> String {
        let mut out = Vec::new();
        write_view(view, &mut out, options).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_minimal_snapshot() {
        let text = render(&view(), &WriteOptions::minimal());
        assert!(text.contains("wall time = 72:00"));
        assert!(text.contains("notes = first\n\tsecond"));
        assert!(!text.contains("retries"));
        assert!(!text.contains("unused"));
        assert!(!text.contains("; source"));
    }

    #[test]
    fn test_complete_snapshot() {
        let text = render(&view(), &WriteOptions::complete());
        assert!(text.starts_with(WORK_CONF_BANNER));
        assert!(text.contains("; default: 24:00\nwall time = 72:00"));
        assert!(text.contains("retries = 3"));
        assert!(text.contains("unused = x"));
        assert!(text.contains("; source: file"));
    }

    #[test]
    fn test_minimal_snapshot_writes_workdir() {
        let view = view();
        view.paths()
            .write()
            .set_token(WORKDIR_TOKEN, "/tmp/run/mytask.work")
            .unwrap();
        let text = render(&view, &WriteOptions::minimal());
        assert!(text.starts_with("[global]\nworkdir = /tmp/run/mytask.work\n"));
    }

    #[test]
    fn test_history_lists_every_entry() {
        let text = render(&view(), &WriteOptions::history());
        assert!(text.contains("wall time = 24:00"));
        assert!(text.contains("wall time = 72:00"));
    }

    #[test]
    fn test_write_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current.conf");
        write_file(&view(), &path, &WriteOptions::minimal()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
                assert!(text.contains("wall time = 72:00"));
    }

    #[test]
    fn test_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("current.conf");
        std::fs::create_dir(&target).unwrap();

        let err = write_file(&view(), &target, &WriteOptions::minimal()).unwrap_err();
        assert!(matches!(err, ConfigError::WriteError { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(target.is_dir());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("work.conf");
        let err = write_file(&view(), &target, &WriteOptions::complete()).unwrap_err();
        assert!(matches!(err, ConfigError::WriteError { .. }));
    }
}
