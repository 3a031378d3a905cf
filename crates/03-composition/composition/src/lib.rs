//! # 配置组合层
//!
//! 把填充器、配置工厂和日志组合起来，提供一步创建配置的入口。
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use config_composition::ConfigBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = ConfigBuilder::new()
//!         .with_config_file("mytask.conf")
//!         .with_overrides(["jobs.wall time=72:00"])
//!         .build()?;
//!
//!     let jobs = factory.config_for(["jobs"]);
//!     let retries = jobs.get_int("retries", Some(3))?;
//!     println!("重试次数: {}", retries);
//!
//!     let report = factory.freeze(false)?;
//!     println!("未使用的配置: {}", report.unused.len());
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod errors;
pub mod logging;
pub mod registry;

pub use builder::{create_config, ConfigBuilder};
pub use errors::{CompositionError, CompositionResult};
pub use logging::{init_logging, LoggingConfig};
pub use registry::{find_registered_config, register_config, registered_configs};
