//! 配置构建器
//!
//! 把常见的配置来源组合成填充器链，交给配置工厂完成引导。

use crate::errors::CompositionResult;
use crate::logging::{init_logging, LoggingConfig};
use crate::registry::register_config;
use config_abstractions::ConfigFiller;
use config_common::PluginRegistry;
use config_impl::{
    ConfigFactory, DefaultFilesConfigFiller, DictConfigFiller, EnvironmentConfigFiller,
    FileConfigFiller, SectionExclusion,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 配置构建器
///
/// 使用建造者模式组装配置来源。来源优先级由条目来源决定，与添加顺序无关：
/// 覆盖项和字典优先于配置文件，配置文件优先于默认配置文件。
pub struct ConfigBuilder {
    /// 主配置文件
    config_file: Option<PathBuf>,
    /// `section.key=value` 形式的覆盖项
    overrides: Vec<String>,
    /// 节 -> 键 -> 值
    dict: BTreeMap<String, BTreeMap<String, String>>,
    /// 是否载入默认配置文件
    use_default_files: bool,
    /// 环境变量前缀
    env_prefix: Option<String>,
    /// 额外的填充器
    additional: Vec<Box<dyn ConfigFiller>>,
    /// 是否登记到进程级登记表
    register: bool,
    /// 进程目录
    process_dir: Option<PathBuf>,
    /// 插件注册表
    plugins: Option<Arc<PluginRegistry>>,
    /// 节排除策略
    exclusion: SectionExclusion,
    /// 日志配置，设置后在构建时初始化日志
    logging: Option<LoggingConfig>,
}

impl ConfigBuilder {
    /// 创建新的配置构建器
    pub fn new() -> Self {
        Self {
            config_file: None,
            overrides: Vec::new(),
            dict: BTreeMap::new(),
            use_default_files: false,
            env_prefix: None,
            additional: Vec::new(),
            register: false,
            process_dir: None,
            plugins: None,
            exclusion: SectionExclusion::default(),
            logging: None,
        }
    }

    /// 设置主配置文件
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 添加 `section.key=value` 形式的覆盖项
    pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides.extend(overrides.into_iter().map(Into::into));
        self
    }

    /// 添加一条字典配置
    pub fn with_value(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.dict
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// 是否载入 `/etc/gridconf.conf`、`~/.gridconf.conf` 和 `$GC_CONFIG`
    pub fn use_default_files(mut self, enabled: bool) -> Self {
        self.use_default_files = enabled;
        self
    }

    /// 从带前缀的环境变量载入配置
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 添加额外的填充器
    pub fn with_filler(mut self, filler: impl ConfigFiller + 'static) -> Self {
        self.additional.push(Box::new(filler));
        self
    }

    /// 构建后登记到进程级登记表
    pub fn register(mut self, enabled: bool) -> Self {
        self.register = enabled;
        self
    }

    /// 设置进程目录
    pub fn with_process_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.process_dir = Some(dir.into());
        self
    }

    /// 设置插件注册表
    pub fn with_plugin_registry(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// 设置节排除策略
    pub fn with_exclusion(mut self, exclusion: SectionExclusion) -> Self {
        self.exclusion = exclusion;
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// 构建配置工厂
    pub fn build(self) -> CompositionResult<ConfigFactory> {
        if let Some(logging) = &self.logging {
            init_logging(logging)?;
        }
        info!("开始创建配置");

        let mut factory = ConfigFactory::builder().with_exclusion(self.exclusion);
        if self.use_default_files {
            let defaults = DefaultFilesConfigFiller::new();
            debug!("默认配置文件: {:?}", defaults.paths());
            factory = factory.with_filler(defaults);
        }
        if let Some(file) = &self.config_file {
            let file = match (&self.process_dir, file.is_relative()) {
                (Some(dir), true) => dir.join(file),
                _ => file.clone(),
            };
            factory = factory
                .with_filler(FileConfigFiller::new([file.clone()]))
                .with_config_file(file);
        }
        if let Some(prefix) = self.env_prefix {
            factory = factory.with_filler(EnvironmentConfigFiller::new(prefix));
        }
        if !self.dict.is_empty() {
            factory = factory.with_filler(DictConfigFiller::from_map(&self.dict));
        }
        if !self.overrides.is_empty() {
            factory = factory.with_filler(DictConfigFiller::from_overrides(&self.overrides)?);
        }
        for filler in self.additional {
            factory = factory.with_boxed_filler(filler);
        }
        if let Some(dir) = self.process_dir {
            factory = factory.with_process_dir(dir);
        }
        if let Some(plugins) = self.plugins {
            factory = factory.with_plugin_registry(plugins);
        }

        let factory = factory.build()?;
        if self.register {
            register_config(factory.config());
        }
        info!("配置创建完成: {}", factory.config_name());
        Ok(factory)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 由配置文件和覆盖项创建配置
pub fn create_config<S: AsRef<str>>(config_file: Option<&Path>, overrides: &[S]) -> CompositionResult<ConfigFactory> {
    let mut builder = ConfigBuilder::new().with_overrides(overrides.iter().map(|s| s.as_ref().to_string()));
    if let Some(file) = config_file {
        builder = builder.with_config_file(file);
    }
    builder.build()
}
