//! 配置工厂
//!
//! 负责引导顺序：填充本次运行的配置并解析插值，用限定到 `global` 节的临时接口
//! 确定工作目录，载入上次运行保存的配置，最后确定持久化的配置名称。

use crate::container::ConfigContainer;
use crate::fillers::{CompatConfigFiller, FileConfigFiller, MultiConfigFiller};
use crate::freeze::{compute_drift, unused_entries, ConfigDrift, FreezeReport, SectionExclusion};
use crate::interface::{ConfigInterface, ReadOptions};
use crate::paths::{ensure_dir_exists, resolve_path, WORKDIR_TOKEN};
use crate::view::{ConfigView, GLOBAL_SECTION};
use crate::writer::{write_file, WriteOptions};
use config_abstractions::ConfigFiller;
use config_common::{global_plugin_registry, ConfigError, ConfigResult, PluginRegistry};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 最小快照文件名
pub const FLAT_CONFIG_FILE: &str = "current.conf";
/// 完整快照文件名
pub const STORED_CONFIG_FILE: &str = "work.conf";
/// 旧版兼容状态文件名
pub const COMPAT_STATE_FILE: &str = "task.dat";

/// 由配置文件名派生名称
///
/// 有配置文件时为 `<文件名去掉扩展名>[.<suffix>]`；否则为 `suffix`，两者都为空时为 `unnamed`。
pub fn derive_name(config_file: Option<&Path>, suffix: &str) -> String {
    let root = config_file
        .and_then(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned());
    match (root, suffix.is_empty()) {
        (Some(root), true) => root,
        (Some(root), false) => format!("{root}.{suffix}"),
        (None, false) => suffix.to_string(),
        (None, true) => "unnamed".to_string(),
    }
}

/// 配置工厂构建器
#[derive(Default)]
pub struct ConfigFactoryBuilder {
    fillers: MultiConfigFiller,
    config_file: Option<PathBuf>,
    plugins: Option<Arc<PluginRegistry>>,
    process_dir: Option<PathBuf>,
    exclusion: SectionExclusion,
}

impl ConfigFactoryBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加配置填充器，按添加顺序执行
    pub fn with_filler(mut self, filler: impl ConfigFiller + 'static) -> Self {
        self.fillers.push(Box::new(filler));
        self
    }

    /// 追加已装箱的配置填充器
    pub fn with_boxed_filler(mut self, filler: Box<dyn ConfigFiller>) -> Self {
        self.fillers.push(filler);
        self
    }

    /// 设置主配置文件，用于派生名称和默认工作目录
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 设置插件注册表，默认使用进程级注册表
    pub fn with_plugin_registry(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// 设置进程目录，默认使用当前工作目录
    pub fn with_process_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.process_dir = Some(dir.into());
        self
    }

    /// 设置节排除策略
    pub fn with_exclusion(mut self, exclusion: SectionExclusion) -> Self {
        self.exclusion = exclusion;
        self
    }

    /// 执行引导并创建配置工厂
    pub fn build(self) -> ConfigResult<ConfigFactory> {
        let process_dir = match self.process_dir {
            Some(dir) if dir.is_dir() => dir,
            Some(dir) => {
                return Err(ConfigError::CurrentDirUnavailable {
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} 不是目录", dir.display()),
                    ),
                })
            }
            None => std::env::current_dir()
                .map_err(|source| ConfigError::CurrentDirUnavailable { source })?,
        };
        let config_file = self
            .config_file
            .map(|file| resolve_path(&file.to_string_lossy(), std::slice::from_ref(&process_dir), true))
            .transpose()?;
        let main_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| process_dir.clone());
        let plugins = self.plugins.unwrap_or_else(global_plugin_registry);

        // 本次运行的配置
        let mut current = ConfigContainer::new("current");
        self.fillers.fill(&mut current)?;
        current.resolve()?;
        let current = Arc::new(RwLock::new(current));

        // 上次运行的配置，载入前不参与查找
        let mut stored = ConfigContainer::new("stored");
        stored.set_enabled(false);
        let stored = Arc::new(RwLock::new(stored));

        let view = ConfigView::new(derive_name(config_file.as_deref(), ""), current.clone(), stored.clone());
        {
            let mut paths = view.paths().write();
            paths.add_search_path(process_dir.clone())?;
            paths.add_search_path(main_dir.clone())?;
        }

        // 临时接口只看 global 节
        let bootstrap = ConfigInterface::new(view.change_view(Some([GLOBAL_SECTION])), plugins.clone());
        let main_dir_text = main_dir.to_string_lossy().into_owned();
        let work_base = bootstrap.get_path("workdir base", Some(main_dir_text.as_str()), false)?;
        let default_work_dir = work_base
            .join(derive_name(config_file.as_deref(), "work"))
            .to_string_lossy()
            .into_owned();
        let work_dir = bootstrap.get_path("workdir", Some(default_work_dir.as_str()), false)?;
        ensure_dir_exists(&work_dir, "工作目录")?;
        view.paths().write().set_token(WORKDIR_TOKEN, work_dir.clone())?;

        let process_dir_text = process_dir.to_string_lossy().into_owned();
        let default_plugin_paths = [process_dir_text.as_str()];
        let plugin_paths = bootstrap.get_paths("plugin paths", Some(&default_plugin_paths[..]), false)?;
        let added = plugins.extend_search_paths(plugin_paths);
        debug!("新增 {} 个插件搜索路径", added);

        let flat_config_path = work_dir.join(FLAT_CONFIG_FILE);
        let stored_config_path = work_dir.join(STORED_CONFIG_FILE);
        if stored_config_path.is_file() {
            let mut stored = stored.write();
            MultiConfigFiller::new()
                .with(FileConfigFiller::new([stored_config_path.clone()]))
                .with(CompatConfigFiller::new(work_dir.join(COMPAT_STATE_FILE)))
                .fill(&mut *stored)?;
            stored.set_enabled(true);
            stored.set_read_only();
            info!(
                target: "config.stored",
                "载入上次运行的配置: {} ({} 个条目)",
                stored_config_path.display(),
                stored.len()
            );
        } else {
            debug!("首次运行，没有找到 {}", stored_config_path.display());
        }

        // 持久化的配置名称只能在载入上次运行的配置之后确定
        let default_name = derive_name(config_file.as_deref(), "");
        let name = bootstrap.get_with("config id", Some(default_name.as_str()), &ReadOptions::new().persistent())?;
        view.set_config_name(name.trim());
        view.paths().write().seal();

        info!("配置工厂初始化完成: {} (工作目录: {})", view.config_name(), work_dir.display());
        Ok(ConfigFactory {
            current,
            stored,
            view,
            plugins,
            process_dir,
            config_file,
            work_dir,
            flat_config_path,
            stored_config_path,
            exclusion: self.exclusion,
        })
    }
}

/// 配置工厂
pub struct ConfigFactory {
    current: Arc<RwLock<ConfigContainer>>,
    stored: Arc<RwLock<ConfigContainer>>,
    view: ConfigView,
    plugins: Arc<PluginRegistry>,
    process_dir: PathBuf,
    config_file: Option<PathBuf>,
    work_dir: PathBuf,
    flat_config_path: PathBuf,
    stored_config_path: PathBuf,
    exclusion: SectionExclusion,
}

impl std::fmt::Debug for ConfigFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFactory")
            .field("name", &self.view.config_name())
            .field("work_dir", &self.work_dir)
            .field("current_entries", &self.current.read().len())
            .field("stored_enabled", &self.stored.read().is_enabled())
            .finish()
    }
}

impl ConfigFactory {
    /// 创建构建器
    pub fn builder() -> ConfigFactoryBuilder {
        ConfigFactoryBuilder::new()
    }

    /// 不限定节的访问接口
    pub fn config(&self) -> ConfigInterface {
        ConfigInterface::new(self.view.unscoped(), self.plugins.clone())
    }

    /// 限定到指定节的访问接口
    pub fn config_for<I, S>(&self, sections: I) -> ConfigInterface
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config().change_view(sections)
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

    /// 进程目录
    pub fn process_dir(&self) -> &Path {
        &self.process_dir
    }

    /// 主配置文件
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// 工作目录
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// 最小快照路径
    pub fn flat_config_path(&self) -> &Path {
        &self.flat_config_path
    }

    /// 完整快照路径
    pub fn stored_config_path(&self) -> &Path {
        &self.stored_config_path
    }

    /// 是否载入了上次运行的配置
    pub fn is_stored_enabled(&self) -> bool {
        self.stored.read().is_enabled()
    }

    /// 节排除策略
    pub fn exclusion(&self) -> &SectionExclusion {
        &self.exclusion
    }

    /// 与上次运行不一致的配置项
    pub fn drift(&self) -> Vec<ConfigDrift> {
        compute_drift(&self.view.unscoped(), &self.exclusion)
    }

    /// 冻结配置
    ///
    /// 封存本次运行的配置并报告未使用的选项；`write_config` 为真或完整快照尚不存在时写出两个快照文件。
    pub fn freeze(&self, write_config: bool) -> ConfigResult<FreezeReport> {
        self.current.write().set_read_only();
        let view = self.view.unscoped();

        let unused = unused_entries(&view, &self.exclusion);
        if !unused.is_empty() {
            info!(target: "config.freeze", "存在 {} 个未使用的配置选项!", unused.len());
            for entry in &unused {
                info!(target: "config.freeze", "\t{}", entry.format(true));
            }
        }

        let mut written = Vec::new();
        if write_config || !self.stored_config_path.exists() {
            ensure_dir_exists(&self.work_dir, "工作目录")?;
            write_file(&view, &self.flat_config_path, &WriteOptions::minimal())?;
            written.push(self.flat_config_path.clone());
            write_file(&view, &self.stored_config_path, &WriteOptions::complete())?;
            written.push(self.stored_config_path.clone());
            info!("配置快照已写入: {}", self.work_dir.display());
        }

        Ok(FreezeReport {
            unused: unused.iter().map(|entry| entry.to_record()).collect(),
            written,
        })
    }
}
