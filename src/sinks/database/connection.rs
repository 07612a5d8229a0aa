//! 数据库连接接口
//!
//! sink 通过此 trait 访问外部数据库连接。连接可能被其他子系统共享，
//! 因此事务状态只能通过 `is_under_transaction` 查询，sink 不保存副本。

use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// 绑定参数类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    Str,
    Int,
    Float,
    Bool,
    Null,
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindType::Str => "str",
            BindType::Int => "int",
            BindType::Float => "float",
            BindType::Bool => "bool",
            BindType::Null => "null",
        };
        f.write_str(name)
    }
}

/// 绑定参数值
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl BindValue {
    /// 值本身对应的类型标签
    pub fn bind_type(&self) -> BindType {
        match self {
            BindValue::Str(_) => BindType::Str,
            BindValue::Int(_) => BindType::Int,
            BindValue::Float(_) => BindType::Float,
            BindValue::Bool(_) => BindType::Bool,
            BindValue::Null => BindType::Null,
        }
    }

    /// 值能否以给定类型绑定，`Null` 可以绑定到任意类型
    pub fn matches(&self, bind_type: BindType) -> bool {
        matches!(self, BindValue::Null) || self.bind_type() == bind_type
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Str(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Str(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Bool(value)
    }
}

/// 连接层错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    /// 语句被拒绝（约束冲突、表结构不匹配、语法错误）
    #[error("Statement rejected: {0}")]
    Rejected(String),

    /// 连接已关闭或丢失
    #[error("Connection is closed")]
    Closed,

    /// 没有打开的事务
    #[error("No active transaction")]
    NoActiveTransaction,

    /// 事务已打开且不支持嵌套
    #[error("A transaction is already active")]
    TransactionAlreadyActive,

    /// 参数数量或类型与类型标签不符
    #[error("Bind mismatch at parameter {index}: expected {expected}, got {actual}")]
    BindMismatch {
        index: usize,
        expected: BindType,
        actual: BindType,
    },

    /// 共享连接的锁已中毒
    #[error("Connection lock poisoned")]
    Poisoned,

    /// 驱动返回的其他错误
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ConnectionError {
    pub fn rejected<S: Into<String>>(msg: S) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }
}

/// 连接层结果类型
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// 数据库连接 trait
///
/// 所有调用都是同步阻塞的，返回时操作已经完成或失败。
pub trait Connection: Send {
    /// 当前是否有打开的事务
    fn is_under_transaction(&mut self) -> bool;

    /// 开启事务，嵌套策略由连接自己决定
    fn begin(&mut self) -> ConnectionResult<()>;

    /// 提交当前事务
    fn commit(&mut self) -> ConnectionResult<()>;

    /// 回滚当前事务
    fn rollback(&mut self) -> ConnectionResult<()>;

    /// 关闭连接，返回是否成功关闭
    fn close(&mut self) -> ConnectionResult<bool>;

    /// 执行参数化语句
    ///
    /// `params` 与 `types` 按位置一一对应。
    fn execute(&mut self, sql: &str, params: &[BindValue], types: &[BindType])
        -> ConnectionResult<()>;
}

/// 在多个子系统之间共享的连接句柄
pub type SharedConnection<C> = Arc<Mutex<C>>;

/// 将连接包装为共享句柄
pub fn share<C: Connection>(connection: C) -> SharedConnection<C> {
    Arc::new(Mutex::new(connection))
}

/// 检查参数与类型标签是否一致
pub fn check_binds(params: &[BindValue], types: &[BindType]) -> ConnectionResult<()> {
    if params.len() != types.len() {
        return Err(ConnectionError::rejected(format!(
            "{} values bound with {} type tags",
            params.len(),
            types.len()
        )));
    }
    for (index, (value, bind_type)) in params.iter().zip(types).enumerate() {
        if !value.matches(*bind_type) {
            return Err(ConnectionError::BindMismatch {
                index,
                expected: *bind_type,
                actual: value.bind_type(),
            });
        }
    }
    Ok(())
}
