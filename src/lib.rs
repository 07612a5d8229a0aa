//! QuantumDbLog - 事务化的数据库日志库
//!
//! QuantumDbLog 将日志逐行写入预先存在的数据库表，由调用方显式控制事务边界，
//! 关闭时自动提交仍然打开的事务。同时提供流输出、日志分发器以及 tracing 桥接层。
//!
//! # 快速开始
//!
//! ```rust
//! use quantum_dblog::core::formatter::LineFormatter;
//! use quantum_dblog::core::item::{LogItem, Severity};
//! use quantum_dblog::sinks::database::{share, DatabaseSink, MemoryConnection};
//! use quantum_dblog::sinks::traits::Adapter;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = share(MemoryConnection::new().with_table("logs", 5));
//!     let mut sink = DatabaseSink::new("app", connection.clone(), "logs")
//!         .with_formatter(LineFormatter::new("{message}"));
//!
//!     sink.begin()?;
//!     sink.process(&LogItem::at_timestamp("boot", Severity::Error, 1000))?;
//!     // 关闭时自动提交
//!     assert!(sink.close()?);
//!
//!     assert_eq!(connection.lock().unwrap().rows("logs").len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! # 接入 tracing
//!
//! ```rust,no_run
//! use quantum_dblog::core::logger::Logger;
//! use quantum_dblog::sinks::stream::StreamSink;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logger = Logger::new("app").with_adapter("stdout", StreamSink::stdout());
//!     let layer = quantum_dblog::install_global(logger, "info")?;
//!
//!     tracing::info!("Application started");
//!
//!     layer.logger().lock().unwrap().close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod env_config;
pub mod error;
pub mod sinks;

// 重新导出主要类型
pub use config::{
    load_config_from_file, load_config_from_str, validate_config, DatabaseSinkConfig,
    DbLogConfig, LogFormatConfig, LogFormatType,
};
pub use crate::core::{
    Formatter, JsonFormatter, LineFormatter, LogItem, Logger, LoggerLayer, Severity,
};
pub use env_config::EnvConfig;
pub use error::{DbLogError, Result};
pub use sinks::{Adapter, AsyncAdapter, BlockingAdapter, DatabaseSink, StreamSink};

use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::core::formatter::build_formatter;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 将 `Logger` 安装为全局 tracing 订阅器
///
/// `filter` 使用 `EnvFilter` 语法，例如 `"info"` 或 `"my_app=debug,hyper=warn"`。
/// 返回的层可用于访问 Logger 以及查询分发失败次数。
pub fn install_global(logger: Logger, filter: &str) -> Result<LoggerLayer> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| DbLogError::tracing(format!("Invalid filter: {}", e)))?;
    let layer = LoggerLayer::new(Arc::new(Mutex::new(logger)));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(layer.clone());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DbLogError::tracing(format!("Failed to set global subscriber: {}", e)))?;

    Ok(layer)
}

/// 根据配置构建 Logger
///
/// 先应用环境变量覆盖再校验配置。配置了数据库输出时写入数据库，否则写入标准输出。
pub fn logger_from_config(mut config: DbLogConfig) -> Result<Logger> {
    EnvConfig::apply_overrides(&mut config);
    validate_config(&config)?;

    let mut logger = Logger::new(config.name.clone());
    logger.set_log_level(config.severity()?);

    match config.database {
        Some(ref database) if database.enabled => {
            add_database_adapter(&mut logger, &config.name, database, &config.format)?;
        }
        _ => {
            let mut sink = StreamSink::stdout();
            sink.set_formatter(build_formatter(&config.format));
            logger.add_adapter("stdout", sink);
        }
    }

    Ok(logger)
}

#[cfg(feature = "sqlite")]
fn add_database_adapter(
    logger: &mut Logger,
    name: &str,
    database: &DatabaseSinkConfig,
    format: &LogFormatConfig,
) -> Result<()> {
    let mut sink = sinks::database::open_sqlite_sink(name, database)?;
    sink.set_formatter(build_formatter(format));
    logger.add_adapter("database", sink);
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn add_database_adapter(
    _logger: &mut Logger,
    _name: &str,
    _database: &DatabaseSinkConfig,
    _format: &LogFormatConfig,
) -> Result<()> {
    Err(DbLogError::config("数据库输出需要启用 sqlite feature"))
}
