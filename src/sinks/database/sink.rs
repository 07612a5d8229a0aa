//!
//! 数据库 Sink 实现
//!
//! 将每条日志作为一行写入预先存在的表中。表结构固定为五列：
//! 自增主键、sink 名称、类型代码、格式化后的消息、时间戳。
//! 事务边界由 sink 的拥有者显式控制，事务状态始终从连接上查询。

use std::fmt;
use std::sync::{MutexGuard, PoisonError};
use tracing::debug;

use crate::core::formatter::{Formatter, LineFormatter};
use crate::core::item::LogItem;
use crate::error::{DbLogError, Result, TransactionOp};
use crate::sinks::database::connection::{
    BindType, BindValue, Connection, ConnectionError, ConnectionResult, SharedConnection,
};
use crate::sinks::traits::Adapter;

/// 插入语句的绑定类型：名称、类型代码、消息、时间
pub const INSERT_BIND_TYPES: [BindType; 4] =
    [BindType::Str, BindType::Int, BindType::Str, BindType::Int];

/// 数据库 Sink 结构体
///
/// 连接由调用方持有并可能与其他子系统共享，sink 只通过共享句柄发起调用。
pub struct DatabaseSink<C: Connection> {
    /// 写入每一行的名称
    name: String,
    /// 共享连接
    connection: SharedConnection<C>,
    /// 目标表名
    table_name: String,
    formatter: Box<dyn Formatter>,
}

impl<C: Connection> fmt::Debug for DatabaseSink<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSink")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("formatter", &self.formatter)
            .field("connection", &"<Connection>")
            .finish()
    }
}

impl<C: Connection> DatabaseSink<C> {
    /// 创建新的数据库 Sink 实例
    ///
    /// 不进行任何 I/O，表名非空由调用方保证。
    pub fn new(
        name: impl Into<String>,
        connection: SharedConnection<C>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connection,
            table_name: table_name.into(),
            formatter: Box::new(LineFormatter::default()),
        }
    }

    /// 使用指定格式化器
    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// 共享连接句柄
    pub fn connection(&self) -> SharedConnection<C> {
        self.connection.clone()
    }

    /// 插入语句
    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {} VALUES (null, ?, ?, ?, ?)", self.table_name)
    }

    /// 某条日志对应的绑定值，顺序与 `INSERT_BIND_TYPES` 一致
    pub fn bind_values(&self, item: &LogItem, message: String) -> [BindValue; 4] {
        [
            BindValue::Str(self.name.clone()),
            BindValue::Int(item.type_code()),
            BindValue::Str(message),
            BindValue::Int(item.timestamp()),
        ]
    }

    fn lock(&self) -> ConnectionResult<MutexGuard<'_, C>> {
        self.connection.lock().map_err(|_| ConnectionError::Poisoned)
    }

    fn transaction<F>(&self, operation: TransactionOp, call: F) -> Result<()>
    where
        F: FnOnce(&mut C) -> ConnectionResult<()>,
    {
        let mut connection = self
            .lock()
            .map_err(|e| DbLogError::transaction(operation, e))?;
        call(&mut connection).map_err(|e| DbLogError::transaction(operation, e))?;
        debug!(sink = %self.name, table = %self.table_name, %operation, "transaction boundary");
        Ok(())
    }
}

impl<C: Connection> Adapter for DatabaseSink<C> {
    fn process(&mut self, item: &LogItem) -> Result<()> {
        let message = self.formatter.format(item)?;
        let params = self.bind_values(item, message);
        let sql = self.insert_sql();

        let mut connection = self
            .lock()
            .map_err(|e| DbLogError::write(self.table_name.clone(), e))?;
        connection
            .execute(&sql, &params, &INSERT_BIND_TYPES)
            .map_err(|e| DbLogError::write(self.table_name.clone(), e))
    }

    fn begin(&mut self) -> Result<()> {
        self.transaction(TransactionOp::Begin, |c| c.begin())
    }

    fn commit(&mut self) -> Result<()> {
        self.transaction(TransactionOp::Commit, |c| c.commit())
    }

    /// 回滚事务
    ///
    /// 如果调用方始终没有提交，则由连接自身的默认行为（关闭时隐式回滚）决定结果。
    fn rollback(&mut self) -> Result<()> {
        self.transaction(TransactionOp::Rollback, |c| c.rollback())
    }

    fn in_transaction(&mut self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_under_transaction()
    }

    /// 关闭连接
    ///
    /// 存在打开的事务时先提交再关闭。提交失败时直接返回错误，连接保持打开。
    fn close(&mut self) -> Result<bool> {
        let mut connection = self.lock().map_err(DbLogError::close)?;

        if connection.is_under_transaction() {
            debug!(sink = %self.name, "committing open transaction before close");
            connection.commit().map_err(DbLogError::close)?;
        }

        let closed = connection.close().map_err(DbLogError::close)?;
        debug!(sink = %self.name, closed, "database sink closed");
        Ok(closed)
    }

    fn formatter(&self) -> &dyn Formatter {
        self.formatter.as_ref()
    }

    fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = formatter;
    }
}
