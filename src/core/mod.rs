//! QuantumDbLog 核心模块
//!
//! 本模块包含日志条目、格式化器、分发器以及 tracing 桥接层。

pub mod formatter;
pub mod item;
pub mod layer;
pub mod logger;

// 重新导出核心类型
pub use formatter::{build_formatter, Formatter, JsonFormatter, LineFormatter};
pub use item::{LogItem, Severity};
pub use layer::LoggerLayer;
pub use logger::Logger;
