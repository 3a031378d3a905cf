//! # gcconf
//!
//! 查看、冻结和比较任务配置的命令行工具

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config_composition::{ConfigBuilder, LoggingConfig};
use config_impl::{write_view, ConfigFactory, WriteOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "gcconf")]
#[command(about = "分层任务配置工具")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖项，形如 `section.key=value`，可重复
    #[arg(short = 'o', long = "override")]
    overrides: Vec<String>,

    /// 载入默认配置文件
    #[arg(long)]
    default_files: bool,

    /// 从带此前缀的环境变量载入配置，例如 GC_
    #[arg(long)]
    env_prefix: Option<String>,

    /// 日志级别
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 读取单个配置值
    Get {
        /// 节名
        section: String,
        /// 键名
        key: String,
        /// 默认值
        #[arg(short, long)]
        default: Option<String>,
    },
    /// 输出合并后的配置
    Dump {
        /// 只输出这些节
        #[arg(short, long)]
        section: Vec<String>,
        /// 输出全部原始条目及其操作符
        #[arg(long)]
        history: bool,
    },
    /// 冻结配置并报告未使用的选项
    Freeze {
        /// 总是写出快照文件
        #[arg(short, long)]
        write: bool,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 比较本次配置与上次运行保存的配置
    Drift {
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
        /// 存在差异时以非零状态退出
        #[arg(long)]
        check: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    config_composition::init_logging(&LoggingConfig::default().with_level(&args.log_level))
        .context("初始化日志失败")?;

    let factory = build_factory(&args)?;
    info!("使用配置 {} (工作目录: {})", factory.config_name(), factory.work_dir().display());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &args.command {
        Command::Get {
            section,
            key,
            default,
        } => {
            let value = factory
                .config_for([section.as_str()])
                .get(key, default.as_deref())
                .with_context(|| format!("读取 [{section}] {key} 失败"))?;
            writeln!(out, "{value}")?;
        }
        Command::Dump { section, history } => {
            let view = if section.is_empty() {
                factory.view().unscoped()
            } else {
                factory.view().change_view(Some(section))
            };
            let options = if *history {
                WriteOptions::history()
            } else {
                WriteOptions::complete()
            };
            write_view(&view, &mut out, &options)?;
        }
        Command::Freeze { write, json } => {
            let report = factory.freeze(*write).context("冻结配置失败")?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                for entry in &report.unused {
                    writeln!(out, "未使用: [{}] {} = {}", entry.section, entry.key, entry.value)?;
                }
                for path in &report.written {
                    writeln!(out, "已写入: {}", path.display())?;
                }
            }
        }
        Command::Drift { json, check } => {
            let drift = factory.drift();
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&drift)?)?;
            } else if !factory.is_stored_enabled() {
                writeln!(out, "没有上次运行保存的配置: {}", factory.stored_config_path().display())?;
            } else {
                for item in &drift {
                    writeln!(
                        out,
                        "[{}] {}: {} -> {}",
                        item.section,
                        item.key,
                        item.stored.as_deref().unwrap_or("<未设置>"),
                        item.current
                    )?;
                }
            }
            if *check && !drift.is_empty() {
                bail!("存在 {} 个与上次运行不一致的配置项", drift.len());
            }
        }
    }
    Ok(())
}

/// 构建配置工厂
fn build_factory(args: &Args) -> Result<ConfigFactory> {
    let mut builder = ConfigBuilder::new()
        .with_overrides(args.overrides.iter().cloned())
        .use_default_files(args.default_files);
    if let Some(config) = &args.config {
        builder = builder.with_config_file(config);
    }
    if let Some(prefix) = &args.env_prefix {
        builder = builder.with_env_prefix(prefix);
    }
    builder.build().context("创建配置失败")
}
