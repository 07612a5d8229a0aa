//! QuantumDbLog Sinks 模块
//!
//! 提供各种日志输出目标的实现：逐行写入数据库表的数据库 sink，
//! 以及写入标准输出、标准错误或文件的流 sink。

pub mod async_adapter;
pub mod database;
pub mod stream;
pub mod traits;

// 重新导出主要类型
pub use async_adapter::{AsyncAdapter, BlockingAdapter};
pub use database::{DatabaseSink, MemoryConnection};
pub use stream::StreamSink;
pub use traits::{Adapter, TransactionQueue};
