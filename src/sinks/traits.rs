//! QuantumDbLog Adapter Traits
//!
//! 定义了统一的 `Adapter` trait 接口，数据库、文件、流等输出目标都实现它，
//! 以便日志分发器可以互换使用。
//!
//! # 使用示例
//!
//! ```rust
//! use quantum_dblog::core::formatter::{Formatter, LineFormatter};
//! use quantum_dblog::core::item::LogItem;
//! use quantum_dblog::error::Result;
//! use quantum_dblog::sinks::traits::{Adapter, TransactionQueue};
//! use quantum_dblog::error::TransactionOp;
//!
//! #[derive(Debug, Default)]
//! struct CountingSink {
//!     written: usize,
//!     queue: TransactionQueue,
//!     formatter: LineFormatter,
//! }
//!
//! impl Adapter for CountingSink {
//!     fn process(&mut self, item: &LogItem) -> Result<()> {
//!         if !self.queue.push(item) {
//!             self.written += 1;
//!         }
//!         Ok(())
//!     }
//!
//!     fn begin(&mut self) -> Result<()> {
//!         self.queue.begin()
//!     }
//!
//!     fn commit(&mut self) -> Result<()> {
//!         self.written += self.queue.take(TransactionOp::Commit)?.len();
//!         Ok(())
//!     }
//!
//!     fn rollback(&mut self) -> Result<()> {
//!         self.queue.take(TransactionOp::Rollback).map(|_| ())
//!     }
//!
//!     fn in_transaction(&mut self) -> bool {
//!         self.queue.is_active()
//!     }
//!
//!     fn close(&mut self) -> Result<bool> {
//!         Ok(true)
//!     }
//!
//!     fn formatter(&self) -> &dyn Formatter {
//!         &self.formatter
//!     }
//!
//!     fn set_formatter(&mut self, _formatter: Box<dyn Formatter>) {}
//! }
//! ```

use crate::core::formatter::Formatter;
use crate::core::item::LogItem;
use crate::error::{DbLogError, Result, TransactionOp};
use crate::sinks::database::connection::ConnectionError;
use std::fmt::Debug;

/// 日志适配器 trait
///
/// 所有输出目标都必须实现此 trait。事务操作由适配器的拥有者显式调用，
/// 分发器只调用 `process`。
pub trait Adapter: Send + Debug {
    /// 写入一条日志
    fn process(&mut self, item: &LogItem) -> Result<()>;

    /// 开启事务
    fn begin(&mut self) -> Result<()>;

    /// 提交事务
    fn commit(&mut self) -> Result<()>;

    /// 回滚事务
    fn rollback(&mut self) -> Result<()>;

    /// 当前是否处于事务中
    fn in_transaction(&mut self) -> bool;

    /// 关闭适配器，返回底层资源的关闭结果
    fn close(&mut self) -> Result<bool>;

    /// 当前使用的格式化器
    fn formatter(&self) -> &dyn Formatter;

    /// 替换格式化器
    fn set_formatter(&mut self, formatter: Box<dyn Formatter>);
}

/// 内存事务队列
///
/// 供没有原生事务的适配器使用：事务期间条目被暂存，提交时按顺序写出，回滚时丢弃。
#[derive(Debug, Default)]
pub struct TransactionQueue {
    items: Option<Vec<LogItem>>,
}

impl TransactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否有打开的事务
    pub fn is_active(&self) -> bool {
        self.items.is_some()
    }

    /// 暂存的条目数
    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 开启事务，不支持嵌套
    pub fn begin(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(DbLogError::transaction(
                TransactionOp::Begin,
                ConnectionError::TransactionAlreadyActive,
            ));
        }
        self.items = Some(Vec::new());
        Ok(())
    }

    /// 事务打开时暂存条目并返回 `true`，否则返回 `false` 由调用方直接写出
    pub fn push(&mut self, item: &LogItem) -> bool {
        match self.items {
            Some(ref mut items) => {
                items.push(item.clone());
                true
            }
            None => false,
        }
    }

    /// 结束事务并取出暂存条目
    pub fn take(&mut self, operation: TransactionOp) -> Result<Vec<LogItem>> {
        self.items
            .take()
            .ok_or_else(|| DbLogError::transaction(operation, ConnectionError::NoActiveTransaction))
    }

    /// 写出失败后放回尚未写出的条目，事务重新处于打开状态
    pub fn restore(&mut self, items: Vec<LogItem>) {
        self.items = Some(items);
    }
}
