//! 配置填充器抽象接口

use crate::entry::{ConfigEntry, EntryOp, EntrySource};
use config_common::ConfigResult;

/// 可接收配置条目的目标
///
/// 配置容器实现此接口；填充器只依赖它而不依赖具体容器。
pub trait EntrySink {
    /// 添加配置条目
    fn add_entry(&mut self, entry: ConfigEntry) -> ConfigResult<()>;

    /// 目标名称
    fn sink_name(&self) -> &str;

    /// 添加一条配置值
    fn add_value(
        &mut self,
        section: &str,
        key: &str,
        value: &str,
        op: EntryOp,
        source: EntrySource,
        origin: &str,
    ) -> ConfigResult<()> {
        self.add_entry(ConfigEntry::new(section, key, value, op, source, origin))
    }
}

/// 配置填充器 trait
///
/// 从单一来源读取配置并写入容器，填充完成后即可丢弃。
pub trait ConfigFiller: Send + Sync {
    /// 填充配置
    fn fill(&self, sink: &mut dyn EntrySink) -> ConfigResult<()>;

    /// 获取填充器名称
    fn name(&self) -> &str;
}
