//! 数据库 Sink 模块
//!
//! 此模块提供了将日志逐行写入数据库表的功能。连接通过 `Connection` trait 抽象，
//! 内置内存实现，启用 `sqlite`、`mysql` 或 `postgres` feature 后可使用 Diesel 连接。

pub mod connection;
pub mod memory;
pub mod sink;

#[cfg(feature = "database")]
pub mod diesel_backend;

pub use connection::{
    share, BindType, BindValue, Connection, ConnectionError, ConnectionResult, SharedConnection,
};
pub use memory::MemoryConnection;
pub use sink::{DatabaseSink, INSERT_BIND_TYPES};

#[cfg(feature = "database")]
pub use diesel_backend::DieselConnection;
#[cfg(feature = "sqlite")]
pub use diesel_backend::{open_sqlite_sink, SqliteLogConnection};
